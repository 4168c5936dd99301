pub mod minifb;
pub mod rodio;

use bitvec::{slice::BitSlice, BitArr};

use crate::chip8::NUM_KEYS;
use crate::emulator::Signal;

// A 16-bit CHIP-8 input message representing the incoming, updated key states
// where the nth bit corresponds to the (n as hex) key status
//
//   Example: 0b1000_0001_0000_1101
//         => keys 0, 2, 3, 8, and F are in the down state
//            and all other keys in the up state
//
pub type InputMsg = BitArr!(for NUM_KEYS);

pub const KEY_DOWN: bool = true;

pub const PX_OFF: bool = false;
pub const PX_ON: bool = true;

// Model input device (e.g. keypad, keyboard, touchscreen, etc.) interfacing with our CHIP-8 system
pub trait InputDevice {
    fn handle_inputs(&mut self) -> Signal;

    fn send_inputs(&self) -> Option<InputMsg>;
}

// Model display device (e.g. UI library window, physical screen, etc.) interfacing with our CHIP-8 system
pub trait DisplayDevice {
    fn receive_frame(&mut self, frame: &BitSlice<usize>) -> &mut dyn DisplayDevice;

    fn drive_display(&mut self);
}

// Model audio device (e.g. audio drivers, beeper, etc.) interfacing with our CHIP-8 system
pub trait AudioDevice {
    fn receive_signal(&mut self, beep: bool);
}
