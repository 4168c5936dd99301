use bitvec::{bitarr, BitArr};

//  Input device: 16-key keypad (0x0-0xF)
//    +------------+
//    | 1  2  3  C |
//    | 4  5  6  D |
//    | 7  8  9  E |
//    | A  0  B  F |
//    +------------+
//  Stored as a 16-bit array with the (n as hex)th bit
//  corresponding to the key state; KEY_UP = 0, KEY_DOWN = 1
pub const NUM_KEYS: usize = 16;

// Wait-for-key protocol (FX0A). The CPU stalls while a wait is pending:
// arming records the destination register, the first fresh press latches
// that key, and only the matching key-up resolves the wait. Requiring the
// full press-and-release cycle keeps the very next EX9E from observing a
// still-held key.
enum Wait {
    Idle,
    Armed { reg: u8 },
    Latched { key: u8 },
}

// Key edges observed while a wait is pending, relayed to the interpreter.
pub enum WaitEvent {
    /// A fresh press was latched; `key` belongs in register `reg`.
    Latched { reg: u8, key: u8 },
    /// The latched key came back up; execution may resume.
    Released,
}

pub struct Keypad {
    keys: BitArr!(for NUM_KEYS),
    wait: Wait,
}

impl Keypad {
    pub fn new() -> Self {
        Keypad {
            keys: bitarr![0; NUM_KEYS],
            wait: Wait::Idle,
        }
    }

    pub fn reset(&mut self) {
        self.keys.fill(false);
        self.wait = Wait::Idle;
    }

    pub fn is_down(&self, key: u8) -> bool {
        self.keys[(key & 0xF) as usize]
    }

    pub fn begin_wait(&mut self, reg: u8) {
        self.wait = Wait::Armed { reg };
    }

    pub fn waiting(&self) -> bool {
        !matches!(self.wait, Wait::Idle)
    }

    // Apply one key transition and advance the wait protocol.
    pub fn set_key(&mut self, key: u8, down: bool) -> Option<WaitEvent> {
        let key = key & 0xF;
        self.keys.set(key as usize, down);

        match self.wait {
            Wait::Armed { reg } if down => {
                self.wait = Wait::Latched { key };
                Some(WaitEvent::Latched { reg, key })
            }
            Wait::Latched { key: latched } if !down && key == latched => {
                self.wait = Wait::Idle;
                Some(WaitEvent::Released)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polled_state_tracks_edges() {
        let mut pad = Keypad::new();
        assert!(!pad.is_down(0x5));

        pad.set_key(0x5, true);
        assert!(pad.is_down(0x5));
        assert!(!pad.is_down(0x6));

        pad.set_key(0x5, false);
        assert!(!pad.is_down(0x5));
    }

    #[test]
    fn wait_resolves_on_press_then_release() {
        let mut pad = Keypad::new();
        pad.begin_wait(0x3);
        assert!(pad.waiting());

        let latch = pad.set_key(0xB, true);
        assert!(matches!(latch, Some(WaitEvent::Latched { reg: 0x3, key: 0xB })));
        // Still held down; the wait must not resolve yet
        assert!(pad.waiting());

        let release = pad.set_key(0xB, false);
        assert!(matches!(release, Some(WaitEvent::Released)));
        assert!(!pad.waiting());
    }

    #[test]
    fn only_the_latched_key_resolves_the_wait() {
        let mut pad = Keypad::new();
        pad.begin_wait(0x0);
        pad.set_key(0x7, true);

        // A second press neither re-latches nor resolves
        assert!(pad.set_key(0x2, true).is_none());
        assert!(pad.set_key(0x2, false).is_none());
        assert!(pad.waiting());

        assert!(matches!(pad.set_key(0x7, false), Some(WaitEvent::Released)));
        assert!(!pad.waiting());
    }

    #[test]
    fn edges_without_a_pending_wait_are_plain_state_updates() {
        let mut pad = Keypad::new();
        assert!(pad.set_key(0x1, true).is_none());
        assert!(pad.set_key(0x1, false).is_none());
    }

    #[test]
    fn reset_cancels_a_pending_wait() {
        let mut pad = Keypad::new();
        pad.begin_wait(0x4);
        pad.set_key(0x9, true);

        pad.reset();
        assert!(!pad.waiting());
        assert!(!pad.is_down(0x9));
    }
}
