use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};

use crate::chip8::{Chip8, Chip8Error};
use crate::clock::{Clock, DEFAULT_CPU_FREQ};
use crate::driver::{AudioDevice, DisplayDevice, InputDevice};

// How long to yield between loop iterations. The clock works off absolute
// elapsed time, so the exact sleep length only bounds input/present latency
const POLL_INTERVAL: Duration = Duration::from_micros(500);

// Control messages flowing from the peripherals back into the main loop
pub enum Signal {
    None,
    NewInputs,
    ProgramExit,
}

pub struct Emulator<'i, 'd, 'a> {
    // The system we're emulating -- CHIP-8
    system: Chip8,
    cpu_freq: u32,

    input_device: &'i RefCell<dyn InputDevice>,
    display: &'d RefCell<dyn DisplayDevice>,
    speaker: &'a RefCell<dyn AudioDevice>,
}

impl<'i, 'd, 'a> Emulator<'i, 'd, 'a> {
    pub fn with_peripherals(
        input: &'i RefCell<dyn InputDevice>,
        display: &'d RefCell<dyn DisplayDevice>,
        audio: &'a RefCell<dyn AudioDevice>,
    ) -> Emulator<'i, 'd, 'a> {
        Emulator {
            system: Chip8::new(),
            cpu_freq: DEFAULT_CPU_FREQ,
            input_device: input,
            display,
            speaker: audio,
        }
    }

    pub fn set_clock_speed(&mut self, freq: u32) {
        self.cpu_freq = freq;
    }

    pub fn load_program(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.system.load_rom(rom)
    }

    //  One iteration interleaves, in order:
    //    1. drain pending host inputs into the keypad
    //    2. catch up on elapsed CPU and timer periods
    //    3. push the framebuffer out if anything was drawn
    //  All VM state is owned here; the peripherals only see messages.
    pub fn run(&mut self) {
        let mut clock = Clock::new(self.cpu_freq, Instant::now());
        log::info!("starting emulation at {} Hz", self.cpu_freq);

        loop {
            // The RefMut must drop before the NewInputs arm borrows again
            let signal = self.input_device.borrow_mut().handle_inputs();
            match signal {
                Signal::ProgramExit => break,
                Signal::NewInputs => {
                    let msg = self.input_device.borrow().send_inputs();
                    self.system.receive_input(msg);
                }
                Signal::None => (),
            }

            let ticks = clock.tick(Instant::now());
            for _ in 0..ticks.cpu {
                // Execution faults are reported and skipped; the show goes on
                if let Err(fault) = self.system.step() {
                    log::warn!("{}", fault);
                }
            }
            for _ in 0..ticks.timer {
                self.system.tick_timers();
            }
            self.speaker.borrow_mut().receive_signal(self.system.beep_on());

            if self.system.take_draw_flag() {
                self.display
                    .borrow_mut()
                    .receive_frame(self.system.framebuffer())
                    .drive_display();
            }

            thread::sleep(POLL_INTERVAL);
        }

        log::info!("shutdown requested, leaving the emulation loop");
    }
}
