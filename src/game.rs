//! Game shell demo: menu, loading, playing and pausing, with a music
//! side-track and a checkpoint toast popup.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tickstate_core::{
    AwaitCompletion, Capability, Completion, Declaration, MachineConfig, MachineError,
    MainStateChanged, Parameter, PopupHandle, PopupState, ReceiveEvent, SideTrack, State,
    StateEvent, StateMachine, StateRef,
};

/// Frames of play before the shell stops itself.
const PLAY_FRAMES: u64 = 90;
const CHECKPOINT_EVERY: u64 = 30;
const TOAST_FRAMES: u32 = 5;

#[derive(Debug, Default)]
pub struct Game {
    pub frame: u64,
    pub score: u64,
    pub save_exists: bool,
    pub finished: bool,
}

/// Logging capability handed to the states that declare it.
pub trait GameLogger {
    fn log(&self, message: &str);
}

pub struct TracingLogger;

impl GameLogger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "game", "{}", message);
    }
}

/// Simulated save-file loader, advanced by the host once per tick.
pub struct SaveLoader {
    completion: Rc<Completion>,
    remaining: Cell<u32>,
}

impl SaveLoader {
    pub fn new(ticks: u32) -> Rc<Self> {
        Rc::new(Self {
            completion: Completion::new(),
            remaining: Cell::new(ticks),
        })
    }

    pub fn completion(&self) -> Rc<Completion> {
        self.completion.clone()
    }

    pub fn poll(&self) {
        match self.remaining.get() {
            0 => {}
            1 => {
                self.remaining.set(0);
                self.completion.complete();
            }
            n => self.remaining.set(n - 1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Channel {
    Music,
}

impl SideTrack for Channel {
    const COUNT: usize = 1;

    fn index(self) -> usize {
        self as usize
    }
}

/// Holds the logger capability for the states that want it.
#[derive(Default)]
struct LoggerSlot(RefCell<Option<Rc<dyn GameLogger>>>);

impl LoggerSlot {
    fn supply(&self, capability: &Capability) {
        if let Some(logger) = capability.get::<dyn GameLogger>() {
            *self.0.borrow_mut() = Some(logger);
        }
    }

    fn log(&self, message: &str) {
        if let Some(logger) = self.0.borrow().as_ref() {
            logger.log(message);
        }
    }
}

#[derive(Default)]
pub struct Init;

impl State<Game> for Init {
    fn update(
        &self,
        machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
    ) -> Result<(), MachineError> {
        machine.change_state::<MainMenu>(None)
    }
}

#[derive(Default)]
pub struct MainMenu {
    logger: LoggerSlot,
}

impl State<Game> for MainMenu {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.needs::<dyn GameLogger>();
    }

    fn on_entered(
        &self,
        _machine: &mut StateMachine<Game>,
        _previous: Option<&StateRef<Game>>,
        _subject: &RefCell<Game>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        self.logger.log("main menu");
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<Game>,
        subject: &RefCell<Game>,
    ) -> Result<(), MachineError> {
        let save_exists = subject.borrow().save_exists;
        if !save_exists {
            return machine.change_state::<NewGame>(None);
        }

        let Some(loader) = machine.component::<SaveLoader>() else {
            return machine.change_state::<NewGame>(None);
        };
        let loading = AwaitCompletion::<GamePlaying>::new(loader.completion())
            .with_parameter(Parameter::new(LoadedSave { score: 1200 }))
            .expecting_source::<MainMenu>();
        self.logger.log("loading save");
        machine.change_state_to(Rc::new(loading), None)
    }

    fn on_capability_supplied(&self, capability: &Capability) {
        self.logger.supply(capability);
    }
}

#[derive(Default)]
pub struct NewGame;

impl State<Game> for NewGame {
    fn on_entered(
        &self,
        machine: &mut StateMachine<Game>,
        _previous: Option<&StateRef<Game>>,
        subject: &RefCell<Game>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        subject.borrow_mut().score = 0;
        machine.change_state::<GamePlaying>(None)
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }
}

/// Payload handed from the loader to the playing state.
#[derive(Debug, Clone)]
pub struct LoadedSave {
    pub score: u64,
}

#[derive(Default)]
pub struct GamePlaying {
    logger: LoggerSlot,
    toast: Cell<Option<(PopupHandle, u32)>>,
}

impl State<Game> for GamePlaying {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.needs::<dyn GameLogger>();
        declaration.on_event::<TogglePause>();
    }

    fn on_entered(
        &self,
        _machine: &mut StateMachine<Game>,
        previous: Option<&StateRef<Game>>,
        subject: &RefCell<Game>,
        parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        let save = tickstate_core::parameter::optional::<LoadedSave>(parameter, "GamePlaying")?;
        if let Some(save) = save {
            subject.borrow_mut().score = save.score;
            self.logger.log(&format!("save loaded, score {}", save.score));
        }
        let resumed = previous.map(|s| s.is::<GamePaused>()).unwrap_or(false);
        self.logger.log(if resumed { "resumed" } else { "playing" });
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<Game>,
        subject: &RefCell<Game>,
    ) -> Result<(), MachineError> {
        let frame = {
            let mut game = subject.borrow_mut();
            game.frame += 1;
            game.score += 10;
            game.frame
        };

        if let Some((handle, age)) = self.toast.get() {
            if age + 1 >= TOAST_FRAMES {
                self.toast.set(None);
                machine.end_popup(handle, None)?;
            } else {
                self.toast.set(Some((handle, age + 1)));
            }
        }

        if frame % CHECKPOINT_EVERY == 0 && self.toast.get().is_none() {
            let score = subject.borrow().score;
            let toast = Rc::new(Toast::new(format!("checkpoint, score {score}")));
            let handle = machine.popup(toast, None)?;
            self.toast.set(Some((handle, 0)));
        }

        if frame >= PLAY_FRAMES {
            machine.change_state::<GameStopping>(None)?;
        }
        Ok(())
    }

    fn on_capability_supplied(&self, capability: &Capability) {
        self.logger.supply(capability);
    }
}

impl ReceiveEvent<Game, TogglePause> for GamePlaying {
    fn receive_event(
        &self,
        machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
        _event: &TogglePause,
    ) -> Result<(), MachineError> {
        machine.change_state::<GamePaused>(None)
    }
}

#[derive(Default)]
pub struct GamePaused {
    logger: LoggerSlot,
}

impl State<Game> for GamePaused {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.needs::<dyn GameLogger>();
        declaration.on_event::<TogglePause>();
    }

    fn on_entered(
        &self,
        _machine: &mut StateMachine<Game>,
        _previous: Option<&StateRef<Game>>,
        _subject: &RefCell<Game>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        self.logger.log("paused");
        Ok(())
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }

    fn on_capability_supplied(&self, capability: &Capability) {
        self.logger.supply(capability);
    }
}

impl ReceiveEvent<Game, TogglePause> for GamePaused {
    fn receive_event(
        &self,
        machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
        _event: &TogglePause,
    ) -> Result<(), MachineError> {
        machine.change_state::<GamePlaying>(None)
    }
}

#[derive(Default)]
pub struct GameStopping;

impl State<Game> for GameStopping {
    fn on_entered(
        &self,
        _machine: &mut StateMachine<Game>,
        _previous: Option<&StateRef<Game>>,
        subject: &RefCell<Game>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        subject.borrow_mut().finished = true;
        Ok(())
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }
}

/// Pause toggle requested by the player; only meaningful in play.
pub struct TogglePause;

impl StateEvent<Game> for TogglePause {
    fn can_invoke(&self, current: &dyn State<Game>) -> bool {
        current.is::<GamePlaying>() || current.is::<GamePaused>()
    }
}

/// Music channel: follows the main state.
#[derive(Default)]
pub struct MusicOn;

impl State<Game> for MusicOn {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.on_event::<MainStateChanged<Game>>();
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }
}

impl ReceiveEvent<Game, MainStateChanged<Game>> for MusicOn {
    fn receive_event(
        &self,
        machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
        event: &MainStateChanged<Game>,
    ) -> Result<(), MachineError> {
        if event.to.is::<GamePaused>() || event.to.is::<GameStopping>() {
            machine.change_side_track_state::<Silence>(Channel::Music, None)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct Silence;

impl State<Game> for Silence {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.on_event::<MainStateChanged<Game>>();
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }
}

impl ReceiveEvent<Game, MainStateChanged<Game>> for Silence {
    fn receive_event(
        &self,
        machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
        event: &MainStateChanged<Game>,
    ) -> Result<(), MachineError> {
        if event.to.is::<GamePlaying>() {
            machine.change_side_track_state::<MusicOn>(Channel::Music, None)?;
        }
        Ok(())
    }
}

/// Short-lived on-screen message.
pub struct Toast {
    text: String,
    logger: LoggerSlot,
}

impl Toast {
    pub fn new(text: String) -> Self {
        Self {
            text,
            logger: LoggerSlot::default(),
        }
    }
}

impl PopupState<Game> for Toast {
    fn declare(declaration: &mut Declaration<Game, Self>) {
        declaration.needs::<dyn GameLogger>();
    }

    fn on_starting(
        &self,
        _machine: &mut StateMachine<Game>,
        _subject: &RefCell<Game>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        self.logger.log(&format!("toast: {}", self.text));
        Ok(())
    }

    fn update(&self, _: &mut StateMachine<Game>, _: &RefCell<Game>) -> Result<(), MachineError> {
        Ok(())
    }

    fn on_capability_supplied(&self, capability: &Capability) {
        self.logger.supply(capability);
    }
}

/// Builds a game shell machine with its capabilities bound.
pub fn build(
    game: &Rc<RefCell<Game>>,
    config: MachineConfig,
    loader: Rc<SaveLoader>,
) -> Result<StateMachine<Game>, MachineError> {
    let mut machine = StateMachine::with_side_tracks_and_config::<Channel>(game, config);
    machine.set_component::<dyn GameLogger>(Rc::new(TracingLogger));
    machine.set_component(loader);
    machine.change_state::<Init>(None)?;
    machine.change_side_track_state::<MusicOn>(Channel::Music, None)?;
    Ok(machine)
}
