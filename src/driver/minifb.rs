use bitvec::{bitarr, slice::BitSlice, BitArr};

use crate::{
    chip8::{DISPLAY_HEIGHT, DISPLAY_WIDTH, NUM_KEYS},
    driver::{DisplayDevice, InputDevice, InputMsg},
    driver::{KEY_DOWN, PX_OFF, PX_ON},
    emulator::Signal,
};

// minifb::Window pixels use ARGB encoding;
// alpha-channel (MSB) is ignored => 0RGB
const PX_OFF_COLOR: u32 = 0x1E1C2D;
const PX_ON_COLOR: u32 = 0xE0DEF4;

// Physical key bound to each pad key, indexed by pad value 0x0-0xF.
// The pad rows 123C / 456D / 789E / A0BF sit on the keyboard rows
// 1234 / QWER / ASDF / YXCV.
const KEYMAP: [minifb::Key; NUM_KEYS] = [
    minifb::Key::X,    // 0x0
    minifb::Key::Key1, // 0x1
    minifb::Key::Key2, // 0x2
    minifb::Key::Key3, // 0x3
    minifb::Key::Q,    // 0x4
    minifb::Key::W,    // 0x5
    minifb::Key::E,    // 0x6
    minifb::Key::A,    // 0x7
    minifb::Key::S,    // 0x8
    minifb::Key::D,    // 0x9
    minifb::Key::Y,    // 0xA
    minifb::Key::C,    // 0xB
    minifb::Key::Key4, // 0xC
    minifb::Key::R,    // 0xD
    minifb::Key::F,    // 0xE
    minifb::Key::V,    // 0xF
];

pub struct Minifb {
    // GUI window
    window: minifb::Window,
    // Auxiliary frame buffer to convert pixels to 32-bit format expected by minifb::Window
    framebuf: [u32; DISPLAY_WIDTH * DISPLAY_HEIGHT],
    // Tx input buffer
    keybuf: BitArr!(for NUM_KEYS),
}

impl Minifb {
    // Window creation is the host's point of no return; failure here is
    // fatal and propagates up to process exit
    pub fn new(name: &str) -> Result<Self, minifb::Error> {
        let window = minifb::Window::new(
            &("CHIP-8: ".to_owned() + name),
            DISPLAY_WIDTH,
            DISPLAY_HEIGHT,
            minifb::WindowOptions {
                resize: true,
                scale: minifb::Scale::X16,
                ..Default::default()
            },
        )?;

        Ok(Minifb {
            window,
            framebuf: [PX_OFF_COLOR; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            keybuf: bitarr![0; NUM_KEYS],
        })
    }
}

impl InputDevice for Minifb {
    fn handle_inputs(&mut self) -> Signal {
        if !self.window.is_open() {
            return Signal::ProgramExit;
        }

        // Poll the bound physical key for every pad key; unmapped keys
        // never enter the snapshot
        let mut next = bitarr![0; NUM_KEYS];
        for (pad_key, physical) in KEYMAP.iter().enumerate() {
            if self.window.is_key_down(*physical) {
                next.set(pad_key, KEY_DOWN);
            }
        }

        if next != self.keybuf {
            self.keybuf = next;
            Signal::NewInputs
        } else {
            Signal::None
        }
    }

    fn send_inputs(&self) -> Option<InputMsg> {
        Some(self.keybuf)
    }
}

impl DisplayDevice for Minifb {
    fn receive_frame(&mut self, frame: &BitSlice<usize>) -> &mut dyn DisplayDevice {
        frame
            .iter()
            .enumerate()
            .for_each(|(idx, pixel)| match *pixel {
                PX_OFF => self.framebuf[idx] = PX_OFF_COLOR,
                PX_ON => self.framebuf[idx] = PX_ON_COLOR,
            });

        self
    }

    fn drive_display(&mut self) {
        self.window
            .update_with_buffer(&self.framebuf, DISPLAY_WIDTH, DISPLAY_HEIGHT)
            .expect("window update failed");
    }
}
