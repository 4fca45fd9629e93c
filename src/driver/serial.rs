//! Physical-device backend driven over a serial console.
//!
//! The device reboots into the test environment between runs, so every run
//! reconnects, waits for the target to ask for its command line, answers,
//! and collects output until the target reports completion. A human
//! operator resets the board when asked to.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::artifacts::ArtifactStore;
use crate::config::DriverConfig;
use crate::driver::{Driver, DriverBase, RunState, TIMEOUT_STATUS};
use crate::error::HarnessError;
use crate::protocol;

/// Per-read deadline on the console. A device that stays silent this long
/// is treated as wedged.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Line-oriented console attached to the target.
///
/// `read_line` returns the next line including its terminator; a
/// zero-length result means the read deadline expired with nothing
/// received.
pub trait TargetConsole {
    fn read_line(&mut self) -> io::Result<String>;
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Opens a console session to the device. The device reboots between runs,
/// so every run asks for a fresh session.
pub trait ConsoleConnector {
    fn connect(&self) -> Result<Box<dyn TargetConsole>, HarnessError>;
}

/// Blocking interaction with the human operating the board.
pub trait Operator {
    /// Shows `message` and waits until the operator acknowledges.
    fn prompt(&mut self, message: &str) -> io::Result<()>;
}

/// [`TargetConsole`] over a real serial port.
pub struct SerialConsole {
    reader: BufReader<Box<dyn serialport::SerialPort>>,
}

impl SerialConsole {
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, HarnessError> {
        let port = serialport::new(device, baud_rate).timeout(READ_TIMEOUT).open()?;
        Ok(Self { reader: BufReader::new(port) })
    }
}

impl TargetConsole for SerialConsole {
    fn read_line(&mut self) -> io::Result<String> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(_) => {}
            // An expired deadline surfaces whatever arrived, possibly
            // nothing. Boot noise is not always valid UTF-8, hence lossy.
            Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(err) => return Err(err),
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.reader.get_mut();
        port.write_all(bytes)?;
        port.flush()
    }
}

/// [`ConsoleConnector`] opening a serial device at a fixed baud rate.
pub struct SerialPortConnector {
    device: String,
    baud_rate: u32,
}

impl SerialPortConnector {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self { device: device.into(), baud_rate }
    }
}

impl ConsoleConnector for SerialPortConnector {
    fn connect(&self) -> Result<Box<dyn TargetConsole>, HarnessError> {
        Ok(Box::new(SerialConsole::open(&self.device, self.baud_rate)?))
    }
}

/// [`Operator`] prompting on the harness's own terminal.
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn prompt(&mut self, message: &str) -> io::Result<()> {
        print!("{message}");
        io::stdout().flush()?;
        let mut ack = String::new();
        io::stdin().read_line(&mut ack)?;
        Ok(())
    }
}

/// Where the command handshake with the target ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Still waiting for the target to ask for its command line.
    AwaitingPrompt,
    /// Command line sent, collecting output.
    Dispatched,
    /// The target reported completion.
    Done,
    /// The console went silent past the read deadline.
    TimedOut,
}

/// Drives one run over the console.
///
/// Every received line is appended verbatim to `log`. The target's request
/// for a command line is answered once with `test_args`; a later repeat of
/// the request (the device rebooted mid-run) is only logged. Returns the
/// state the handshake terminated in.
fn drive_handshake(
    console: &mut dyn TargetConsole,
    operator: &mut dyn Operator,
    log: &mut dyn Write,
    state: &mut RunState,
    test_args: &str,
) -> Result<HandshakeState, HarnessError> {
    let mut phase = HandshakeState::AwaitingPrompt;
    loop {
        let line = console.read_line()?;
        if line.is_empty() {
            state.set_status(TIMEOUT_STATUS);
            operator.prompt("Timeout. Press ENTER and then reset the device...")?;
            return Ok(HandshakeState::TimedOut);
        }
        log.write_all(line.as_bytes())?;
        if phase == HandshakeState::AwaitingPrompt && line.contains(protocol::CTRL_GET_COMMAND_LINE) {
            console.send(test_args.as_bytes())?;
            console.send(b"\r")?;
            phase = HandshakeState::Dispatched;
        } else if line.contains(protocol::CTRL_FINISHED) {
            return Ok(HandshakeState::Done);
        }
    }
}

/// Waits for the target's next command prompt and tells it to leave the
/// test environment, so the board is usable after the session.
fn send_exit_when_prompted(
    console: &mut dyn TargetConsole,
    operator: &mut dyn Operator,
) -> Result<(), HarnessError> {
    loop {
        let line = console.read_line()?;
        if line.is_empty() {
            operator.prompt("Timeout. Press ENTER and then reset the device...")?;
        } else if line.contains(protocol::CTRL_GET_COMMAND_LINE) {
            console.send(b"exit")?;
            console.send(b"\r")?;
            return Ok(());
        }
    }
}

/// Runs tests on a physical board attached over a serial line.
pub struct SerialDriver {
    base: DriverBase,
    connector: Box<dyn ConsoleConnector>,
    operator: Box<dyn Operator>,
}

impl SerialDriver {
    /// With `init_wait` the operator is asked to reset the board first, so
    /// the first run starts from a clean boot.
    pub fn new(
        config: DriverConfig,
        artifacts: ArtifactStore,
        connector: Box<dyn ConsoleConnector>,
        operator: Box<dyn Operator>,
        init_wait: bool,
    ) -> Result<Self, HarnessError> {
        let mut driver = Self {
            base: DriverBase::new(config, artifacts),
            connector,
            operator,
        };
        if init_wait {
            driver.operator.prompt("Press ENTER and then reset the device...")?;
        }
        Ok(driver)
    }
}

impl Driver for SerialDriver {
    fn run(&mut self, run_name: &str, test_args: &str, _is_long_running: bool) -> Result<String, HarnessError> {
        let mut state = self.base.start_run(run_name)?;
        let mut console = self.connector.connect()?;
        let mut log = OpenOptions::new().append(true).open(state.log_path())?;
        drive_handshake(console.as_mut(), self.operator.as_mut(), &mut log, &mut state, test_args)?;
        drop(log);
        self.base.finish_run(&state)
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        let mut console = self.connector.connect()?;
        send_exit_when_prompted(console.as_mut(), self.operator.as_mut())
    }

    fn name(&self) -> &'static str {
        "SerialDriver"
    }

    fn cpu(&self) -> Option<&str> {
        self.base.config().cpu.as_deref()
    }

    fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError> {
        self.base.run_log(run_name)
    }
}
