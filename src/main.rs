mod chip8;
mod clock;
mod driver;
mod emulator;

use std::cell::RefCell;
use std::error::Error;
use std::fs;
use std::path::Path;

use driver::{minifb::Minifb, rodio::Rodio};
use emulator::Emulator;

// Command line arguments
struct Args {
    rom: String,
    cpu_freq: u32,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let help_msg = "\
USAGE:
    cargo run -- [OPTIONS] [ROM]

ARGS:
    <ROM>    Filepath to the CHIP-8 ROM to be read by the emulator. A list of
             ROMs released to the public domain can be found at:
                 - https://zophar.net/pdroms/chip8/chip-8-games-pack.html
                 - https://johnearnest.github.io/chip8Archive/?sort=platform

OPTIONS:
    -h, --help          Print this help message.
    -f, --freq=NUM      Set the clock rate of the emulator (Hz) to uint NUM
                          in the range 1-2000. (default: 400)

KEYMAP:
    +---+---+---+---+
    | 1 | 2 | 3 | 4 |
    +---+---+---+---+
    | Q | W | E | R |
    +---+---+---+---+
    | A | S | D | F |
    +---+---+---+---+
    | Y | X | C | V |
    +---+---+---+---+    ";

    let mut rom = None;
    let mut cpu_freq = clock::DEFAULT_CPU_FREQ;

    let mut parser = lexopt::Parser::from_env();

    while let Some(arg) = parser.next()? {
        match arg {
            Short('f') | Long("freq") => {
                cpu_freq = parser.value()?.parse()?;
                if !(1..=2000).contains(&cpu_freq) {
                    return Err("out of bounds value for option '--freq'".into());
                }
            }
            Value(path) if rom.is_none() => {
                rom = Some(path.string()?);
            }

            Short('h') | Long("help") => {
                println!("{}", help_msg);
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Args {
        rom: rom.ok_or(
            "missing argument <ROM>\n
  Refer to --help for more information",
        )?,
        cpu_freq,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = parse_args()?;
    let rom = fs::read(&args.rom)?;
    let program_name = Path::new(&args.rom)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("?");

    // The window doubles as the key-event source; devices outlive the
    // emulator and are torn down in reverse order when main returns
    let window = RefCell::new(Minifb::new(program_name)?);
    let speaker = RefCell::new(Rodio::new()?);

    let mut emu = Emulator::with_peripherals(&window, &window, &speaker);
    emu.set_clock_speed(args.cpu_freq);
    emu.load_program(&rom)?;
    emu.run();

    Ok(())
}
