//! Movement controller demo: a character that stands, jumps and falls.
//! Jumping requires a [`JumpParameter`]; landing hands control back to
//! standing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tickstate_core::parameter;
use tickstate_core::{MachineConfig, MachineError, Parameter, State, StateMachine, StateRef};

const GRAVITY: f32 = 0.5;
const BASE_JUMP: f32 = 3.0;

#[derive(Debug, Default)]
pub struct Character {
    pub height: f32,
    pub velocity: f32,
    pub jumps: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct JumpParameter {
    pub multiplier: f32,
}

/// Jumps every `interval` frames with an alternating multiplier.
#[derive(Default)]
pub struct Standing {
    frames: Cell<u32>,
}

impl Standing {
    const INTERVAL: u32 = 12;
}

impl State<Character> for Standing {
    fn on_entered(
        &self,
        _machine: &mut StateMachine<Character>,
        _previous: Option<&StateRef<Character>>,
        subject: &RefCell<Character>,
        _parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        self.frames.set(0);
        let mut character = subject.borrow_mut();
        character.height = 0.0;
        character.velocity = 0.0;
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<Character>,
        subject: &RefCell<Character>,
    ) -> Result<(), MachineError> {
        let frames = self.frames.get() + 1;
        self.frames.set(frames);
        if frames < Self::INTERVAL {
            return Ok(());
        }

        let multiplier = if subject.borrow().jumps % 2 == 0 { 1.0 } else { 2.0 };
        machine.change_state::<Jumping>(Some(Parameter::new(JumpParameter { multiplier })))
    }
}

#[derive(Default)]
pub struct Jumping;

impl State<Character> for Jumping {
    fn on_entered(
        &self,
        _machine: &mut StateMachine<Character>,
        _previous: Option<&StateRef<Character>>,
        subject: &RefCell<Character>,
        parameter: Option<&Parameter>,
    ) -> Result<(), MachineError> {
        let jump = parameter::require::<JumpParameter>(parameter, "Jumping")?;
        let mut character = subject.borrow_mut();
        character.velocity = BASE_JUMP * jump.multiplier;
        character.jumps += 1;
        tracing::debug!(target: "movement", multiplier = jump.multiplier, "jump");
        Ok(())
    }

    fn update(
        &self,
        machine: &mut StateMachine<Character>,
        subject: &RefCell<Character>,
    ) -> Result<(), MachineError> {
        let velocity = {
            let mut character = subject.borrow_mut();
            character.height += character.velocity;
            character.velocity -= GRAVITY;
            character.velocity
        };
        if velocity <= 0.0 {
            machine.change_state::<Falling>(None)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct Falling;

impl State<Character> for Falling {
    fn update(
        &self,
        machine: &mut StateMachine<Character>,
        subject: &RefCell<Character>,
    ) -> Result<(), MachineError> {
        let landed = {
            let mut character = subject.borrow_mut();
            character.height += character.velocity;
            character.velocity -= GRAVITY;
            character.height <= 0.0
        };
        if landed {
            machine.change_state::<Standing>(None)?;
        }
        Ok(())
    }
}

pub fn build(
    character: &Rc<RefCell<Character>>,
    config: MachineConfig,
) -> Result<StateMachine<Character>, MachineError> {
    let mut machine = StateMachine::with_config(character, config);
    machine.change_state::<Standing>(None)?;
    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_cycle_returns_to_ground() {
        let character = Rc::new(RefCell::new(Character::default()));
        let mut machine = build(&character, MachineConfig::default()).unwrap();

        let mut peak = 0.0f32;
        let mut ticks = 0;
        while character.borrow().jumps < 2 || !machine.is_current::<Standing>() {
            machine.update().unwrap();
            peak = peak.max(character.borrow().height);
            ticks += 1;
            assert!(ticks < 500);
        }
        assert_eq!(character.borrow().height, 0.0);
        assert!(peak > BASE_JUMP);
    }

    #[test]
    fn test_jump_without_parameter_fails() {
        let character = Rc::new(RefCell::new(Character::default()));
        let mut machine = build(&character, MachineConfig::default()).unwrap();
        let err = machine.change_state::<Jumping>(None).unwrap_err();
        assert_eq!(err.error_code(), "PARAMETER_TYPE_MISMATCH");
    }
}
