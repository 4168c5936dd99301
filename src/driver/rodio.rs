use std::error::Error;

use rodio::Source;

use crate::driver::AudioDevice;

// A4 pure tone, quiet enough not to startle anyone
const BEEP_FREQ: f32 = 440.0;
const BEEP_AMPLITUDE: f32 = 0.1;

pub struct Rodio {
    // Output audio stream; must stay alive for the sink to keep a device
    _stream: rodio::OutputStream,
    // Handle to the playback queue holding one endless, usually-paused tone
    sink: rodio::Sink,
}

impl Rodio {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        let (stream, handle) = rodio::OutputStream::try_default()?;
        let sink = rodio::Sink::try_new(&handle)?;

        let source = rodio::source::SineWave::new(BEEP_FREQ).amplify(BEEP_AMPLITUDE);
        sink.append(source);
        sink.pause();

        Ok(Rodio {
            _stream: stream,
            sink,
        })
    }
}

impl AudioDevice for Rodio {
    // The sound timer gates the tone: audible exactly while it is nonzero
    fn receive_signal(&mut self, beep: bool) {
        if beep {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }
}
