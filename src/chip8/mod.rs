mod frame;
mod instruction;
mod keypad;

use bitvec::slice::BitSlice;
use smallvec::SmallVec;

use crate::driver::InputMsg;
use frame::Frame;
use instruction::Instruction;
use keypad::{Keypad, WaitEvent};

pub use frame::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
pub use keypad::NUM_KEYS;

//    CHIP-8 Virtual Machine memory layout:
//    +-----------------------------------+= 0xFFF (4095) End of CHIP-8 RAM
//    |                                   |
//    |                                   |
//    |                                   |
//    |           0x200 to 0xFFF          |
//    |        CHIP-8 Program / Data      |
//    |                                   |
//    |                 .                 |
//    /                 .                 /
//    /                 .                 /
//    |                                   |
//    +-----------------------------------+= 0x200 (512) Start of CHIP-8 programs
//    |           0x000 to 0x1FF          |
//    |        Reserved for CHIP-8        |
//    |            interpreter            |
//    + - - - - - - - - - - - - - - - - - += 0x50 (80)* End of conventional CHIP-8 font set
//    |            0x00 to 0x50           |
//    |          CHIP-8 Font Data         |
//    |             '0' - 'F'             |
//    +-----------------------------------+= 0x000 (0) Start of CHIP-8 RAM
//
//  NOTE:
//    Modern implementations are not restricted around the lower 512 bytes since the
//    interpreter runs outside of CHIP-8's specified 4KiB memory space. Instead, it
//    is common to store font data representing the hexadecimal digits there.

const RAM_SIZE: usize = 4096;
const ADDR_MASK: u16 = 0x0FFF; // I is 16 bits wide but only 12 address RAM
const FONT_START: u16 = 0x000; // Starting addr of fonts (== RAM_START)
const ROM_START: u16 = 0x200; // Starting addr of CHIP-8 programs
const STACK_DEPTH: usize = 16;
const NUM_DATA_REGS: usize = 16;
const PC_STEP: u16 = 2; // mem::size_of::<Instruction>() / chip8_addressable_unit = 2

// Everything above the program entry point is loadable
pub const MAX_ROM_SIZE: usize = RAM_SIZE - ROM_START as usize;

// Pre-defined "static" font data that will occupy memory reserved for the interpreter (<0x200)
const FONT_SPRITES: [[u8; FONT_PX_HEIGHT]; 16] = [
    [0xF0, 0x90, 0x90, 0x90, 0xF0], // 0
    [0x20, 0x60, 0x20, 0x20, 0x70], // 1
    [0xF0, 0x10, 0xF0, 0x80, 0xF0], // 2
    [0xF0, 0x10, 0xF0, 0x10, 0xF0], // 3
    [0x90, 0x90, 0xF0, 0x10, 0x10], // 4
    [0xF0, 0x80, 0xF0, 0x10, 0xF0], // 5
    [0xF0, 0x80, 0xF0, 0x90, 0xF0], // 6
    [0xF0, 0x10, 0x20, 0x40, 0x40], // 7
    [0xF0, 0x90, 0xF0, 0x90, 0xF0], // 8
    [0xF0, 0x90, 0xF0, 0x10, 0xF0], // 9
    [0xF0, 0x90, 0xF0, 0x90, 0x90], // A
    [0xE0, 0x90, 0xE0, 0x90, 0xE0], // B
    [0xF0, 0x80, 0x80, 0x80, 0xF0], // C
    [0xE0, 0x90, 0x90, 0x90, 0xE0], // D
    [0xF0, 0x80, 0xF0, 0x80, 0xF0], // E
    [0xF0, 0x80, 0xF0, 0x80, 0x80], // F
];
const FONT_PX_HEIGHT: usize = 5;

// Faults the interpreter surfaces. Only an oversized ROM is fatal; the
// execution faults leave the VM in a defined state with the offending
// instruction skipped, so the caller may log and keep running.
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is {} bytes; at most {} fit above the program entry point", .0, MAX_ROM_SIZE)]
    RomTooLarge(usize),
    #[error("call stack exhausted by CALL at {pc:#05X}")]
    StackOverflow { pc: u16 },
    #[error("RET with an empty call stack at {pc:#05X}")]
    StackUnderflow { pc: u16 },
    #[error("unrecognized opcode {opcode:#06X} at {pc:#05X}")]
    UnknownOpcode { opcode: u16, pc: u16 },
}

pub struct Chip8 {
    // RAM of the CHIP-8 VM
    memory: [u8; RAM_SIZE],
    // Program Counter
    pc: u16,
    // CHIP-8 call stack; its only purpose is to push/pop any callers' return address.
    // Sixteen frames deep; a CALL beyond that faults instead of spilling
    stack: SmallVec<[u16; STACK_DEPTH]>,
    // I - the address register
    i_reg: u16,
    // V - general purpose data registers; VF doubles as the carry/borrow/collision flag
    v_reg: [u8; NUM_DATA_REGS],
    // Output device: 64x32-pixel monochrome display
    frame: Frame,
    // Raised by any instruction that touches the display, consumed by the host
    draw_flag: bool,
    // Input device: 16-key keypad, including the FX0A wait protocol
    keypad: Keypad,
    // General timer used for game events
    delay_timer: u8,
    // Timer for sound effects; a beep is made while the value is nonzero
    sound_timer: u8,
    // Random source for CXNN; owned so tests can seed it
    rng: fastrand::Rng,
}

impl Chip8 {
    pub fn new() -> Self {
        let mut sys = Chip8 {
            memory: [0; RAM_SIZE],
            pc: ROM_START,
            stack: SmallVec::new(),
            i_reg: 0,
            v_reg: [0; NUM_DATA_REGS],
            frame: Frame::new(),
            draw_flag: false,
            keypad: Keypad::new(),
            delay_timer: 0,
            sound_timer: 0,
            rng: fastrand::Rng::new(),
        };

        sys.load_fonts();
        sys
    }

    pub fn reset(&mut self) {
        self.memory = [0; RAM_SIZE];
        self.pc = ROM_START;
        self.stack.clear();
        self.i_reg = 0;
        self.v_reg = [0; NUM_DATA_REGS];
        self.frame.clear();
        self.draw_flag = false;
        self.keypad.reset();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.load_fonts();
    }

    fn load_fonts(&mut self) {
        for (i, font) in FONT_SPRITES.iter().flatten().enumerate() {
            self.memory[(FONT_START as usize) + i] = *font;
        }
    }

    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), Chip8Error> {
        if data.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge(data.len()));
        }

        let start = ROM_START as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    // One fetch-decode-execute cycle. A pending FX0A wait stalls the whole
    // cycle; the wait is resolved by key edges arriving through `set_key`.
    pub fn step(&mut self) -> Result<(), Chip8Error> {
        if self.keypad.waiting() {
            return Ok(());
        }

        let word = self.fetch();
        log::trace!("{:#05X}: {:04X}", self.pc, word);
        self.exec(Instruction::decode(word))
    }

    fn fetch(&self) -> u16 {
        // CHIP-8 instructions are stored big-endian. Both byte reads wrap
        // modulo the address space, so fetch is total even at the top end
        let hb = self.memory[(self.pc & ADDR_MASK) as usize];
        let lb = self.memory[((self.pc + 1) & ADDR_MASK) as usize];
        u16::from_be_bytes([hb, lb])
    }

    fn exec(&mut self, instr: Instruction) -> Result<(), Chip8Error> {
        // Whether to step the PC at the end of the cycle; false if any jumps are issued
        let mut incr_pc = true;
        let mut fault = None;
        let pc = self.pc;

        match instr {
            // 00E0 - CLS
            Instruction::Cls => {
                self.frame.clear();
                self.draw_flag = true;
            }
            // 00EE - RET; lands past the caller's CALL word via the shared PC step below
            Instruction::Ret => match self.stack.pop() {
                Some(ret_addr) => self.pc = ret_addr,
                None => fault = Some(Chip8Error::StackUnderflow { pc }),
            },
            // 0NNN - SYS addr; a COSMAC-era machine routine call, ignored here
            Instruction::Sys(addr) => {
                log::debug!("ignoring machine routine call to {:#05X}", addr);
            }
            // 1NNN - JP addr
            Instruction::Jp(addr) => {
                self.pc = addr;
                incr_pc = false;
            }
            // 2NNN - CALL addr
            Instruction::Call(addr) => {
                if self.stack.len() == STACK_DEPTH {
                    fault = Some(Chip8Error::StackOverflow { pc });
                } else {
                    self.stack.push(self.pc);
                    self.pc = addr;
                    incr_pc = false;
                }
            }
            // 3XNN - SE Vx, byte
            Instruction::SeByte { x, nn } => {
                if self.v_reg[x as usize] == nn {
                    self.pc += PC_STEP;
                }
            }
            // 4XNN - SNE Vx, byte
            Instruction::SneByte { x, nn } => {
                if self.v_reg[x as usize] != nn {
                    self.pc += PC_STEP;
                }
            }
            // 5XY0 - SE Vx, Vy
            Instruction::SeReg { x, y } => {
                if self.v_reg[x as usize] == self.v_reg[y as usize] {
                    self.pc += PC_STEP;
                }
            }
            // 6XNN - LD Vx, byte
            Instruction::LdByte { x, nn } => self.v_reg[x as usize] = nn,
            // 7XNN - ADD Vx, byte; VF untouched
            Instruction::AddByte { x, nn } => {
                self.v_reg[x as usize] = self.v_reg[x as usize].wrapping_add(nn);
            }
            // 8XY0 - LD Vx, Vy
            Instruction::LdReg { x, y } => self.v_reg[x as usize] = self.v_reg[y as usize],
            // 8XY1 - OR Vx, Vy
            Instruction::Or { x, y } => self.v_reg[x as usize] |= self.v_reg[y as usize],
            // 8XY2 - AND Vx, Vy
            Instruction::And { x, y } => self.v_reg[x as usize] &= self.v_reg[y as usize],
            // 8XY3 - XOR Vx, Vy
            Instruction::Xor { x, y } => self.v_reg[x as usize] ^= self.v_reg[y as usize],
            // 8XY4 - ADD Vx, Vy; VF = carry. VF is written after Vx so the
            // flag is computed from the pre-add operands even when x == 0xF
            Instruction::AddReg { x, y } => {
                let (vx, carry) = self.v_reg[x as usize].overflowing_add(self.v_reg[y as usize]);
                self.v_reg[x as usize] = vx;
                self.v_reg[0xF] = carry as u8;
            }
            // 8XY5 - SUB Vx, Vy; VF = NOT borrow
            Instruction::Sub { x, y } => {
                let (vx, borrow) = self.v_reg[x as usize].overflowing_sub(self.v_reg[y as usize]);
                self.v_reg[x as usize] = vx;
                self.v_reg[0xF] = !borrow as u8;
            }
            // 8XY6 - SHR Vx; VF = shifted-out lsb
            Instruction::Shr { x } => {
                let lsb = self.v_reg[x as usize] & 0x1;
                self.v_reg[x as usize] >>= 1;
                self.v_reg[0xF] = lsb;
            }
            // 8XY7 - SUBN Vx, Vy; VF = NOT borrow
            Instruction::Subn { x, y } => {
                let (vx, borrow) = self.v_reg[y as usize].overflowing_sub(self.v_reg[x as usize]);
                self.v_reg[x as usize] = vx;
                self.v_reg[0xF] = !borrow as u8;
            }
            // 8XYE - SHL Vx; VF = shifted-out msb
            Instruction::Shl { x } => {
                let msb = (self.v_reg[x as usize] >> (u8::BITS - 1)) & 0x1;
                self.v_reg[x as usize] <<= 1;
                self.v_reg[0xF] = msb;
            }
            // 9XY0 - SNE Vx, Vy
            Instruction::SneReg { x, y } => {
                if self.v_reg[x as usize] != self.v_reg[y as usize] {
                    self.pc += PC_STEP;
                }
            }
            // ANNN - LD I, addr
            Instruction::LdI(addr) => self.i_reg = addr,
            // BNNN - JP V0, addr
            Instruction::JpV0(addr) => {
                self.pc = (addr + self.v_reg[0x0] as u16) & ADDR_MASK;
                incr_pc = false;
            }
            // CXNN - RND Vx, byte
            Instruction::Rnd { x, nn } => {
                self.v_reg[x as usize] = self.rng.u8(..) & nn;
            }
            // DXYN - DRW Vx, Vy, nibble; VF = collision. Sprite rows are read
            // through the 12-bit address mask; pixels wrap at the display edges
            Instruction::Drw { x, y, n } => {
                let base = (self.i_reg & ADDR_MASK) as usize;
                let mut rows = [0u8; 15];
                let sprite = &mut rows[..n as usize];
                for (r, byte) in sprite.iter_mut().enumerate() {
                    *byte = self.memory[(base + r) % RAM_SIZE];
                }

                let origin = (self.v_reg[x as usize], self.v_reg[y as usize]);
                self.v_reg[0xF] = self.frame.blit(origin, sprite) as u8;
                self.draw_flag = true;
            }
            // EX9E - SKP Vx
            Instruction::Skp { x } => {
                if self.keypad.is_down(self.v_reg[x as usize]) {
                    self.pc += PC_STEP;
                }
            }
            // EXA1 - SKNP Vx
            Instruction::Sknp { x } => {
                if !self.keypad.is_down(self.v_reg[x as usize]) {
                    self.pc += PC_STEP;
                }
            }
            // FX07 - LD Vx, DT
            Instruction::LdFromDelay { x } => self.v_reg[x as usize] = self.delay_timer,
            // FX0A - LD Vx, K; park on this instruction until a fresh
            // press-and-release cycle arrives through `set_key`
            Instruction::WaitKey { x } => {
                self.keypad.begin_wait(x);
                incr_pc = false;
            }
            // FX15 - LD DT, Vx
            Instruction::LdDelay { x } => self.delay_timer = self.v_reg[x as usize],
            // FX18 - LD ST, Vx
            Instruction::LdSound { x } => self.sound_timer = self.v_reg[x as usize],
            // FX1E - ADD I, Vx; wraps at 16 bits, VF untouched
            Instruction::AddI { x } => {
                self.i_reg = self.i_reg.wrapping_add(self.v_reg[x as usize] as u16);
            }
            // FX29 - LEA I, F(Vx)
            Instruction::LdFont { x } => {
                // Address for the font sprite representing hex digit '{Vx}'
                //             = FONT_START + Vx * bytes_per_font_sprite
                let digit = (self.v_reg[x as usize] & 0xF) as u16;
                self.i_reg = FONT_START + digit * FONT_PX_HEIGHT as u16;
            }
            // FX33 - LD [I], D2(Vx)
            //           [I + 1], D1(Vx)
            //           [I + 2], D0(Vx)
            Instruction::Bcd { x } => {
                let vx = self.v_reg[x as usize];
                // Extracts the n-th decimal digit
                let d = |val, n| val / u8::pow(10, n) % 10;
                let base = (self.i_reg & ADDR_MASK) as usize;
                self.memory[base] = d(vx, 2);
                self.memory[(base + 1) % RAM_SIZE] = d(vx, 1);
                self.memory[(base + 2) % RAM_SIZE] = d(vx, 0);
            }
            // FX55 - LD [I..=I+x], V0..=Vx; I itself stays put
            Instruction::Store { x } => {
                let base = (self.i_reg & ADDR_MASK) as usize;
                for offset in 0..=(x as usize) {
                    self.memory[(base + offset) % RAM_SIZE] = self.v_reg[offset];
                }
            }
            // FX65 - LD V0..=Vx, [I..=I+x]; I itself stays put
            Instruction::Load { x } => {
                let base = (self.i_reg & ADDR_MASK) as usize;
                for offset in 0..=(x as usize) {
                    self.v_reg[offset] = self.memory[(base + offset) % RAM_SIZE];
                }
            }
            Instruction::Unknown(word) => {
                fault = Some(Chip8Error::UnknownOpcode { opcode: word, pc });
            }
        }

        if incr_pc {
            self.pc = (self.pc + PC_STEP) & ADDR_MASK;
        }

        match fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    // Rx one key transition from the host. While an FX0A wait is pending,
    // a press latches the key into the destination register and the matching
    // release lets execution resume past the wait instruction.
    pub fn set_key(&mut self, key: u8, down: bool) {
        match self.keypad.set_key(key, down) {
            Some(WaitEvent::Latched { reg, key }) => self.v_reg[reg as usize] = key,
            Some(WaitEvent::Released) => self.pc = (self.pc + PC_STEP) & ADDR_MASK,
            None => (),
        }
    }

    // Rx 16-bit input key state; diffed against the pad so only fresh
    // transitions feed the wait protocol
    pub fn receive_input(&mut self, msg: Option<InputMsg>) {
        if let Some(next) = msg {
            for key in 0..NUM_KEYS as u8 {
                let down = next[key as usize];
                if down != self.keypad.is_down(key) {
                    self.set_key(key, down);
                }
            }
        }
    }

    pub fn tick_timers(&mut self) {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }
        if self.sound_timer > 0 {
            self.sound_timer -= 1;
        }
    }

    // Tx 1-bit sound channel
    pub fn beep_on(&self) -> bool {
        self.sound_timer > 0
    }

    // Tx 2048 (64x32) bit display out
    pub fn framebuffer(&self) -> &BitSlice<usize> {
        self.frame.as_bits()
    }

    pub fn take_draw_flag(&mut self) -> bool {
        std::mem::take(&mut self.draw_flag)
    }
}
