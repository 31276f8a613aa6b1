//! Host orchestrator CLI: wires a MAC, a transport, and the protocol engine
//! together and exposes the `update` / `client-info` / `dump` /
//! `change-mode` entry points.
//!
//! Argument parsing, the concrete serial `Mac`, and the file-backed image
//! reader/writer are this binary's own concern, not the library's -- the
//! library only defines the MAC/image-reader contracts, not the drivers
//! themselves. This is one illustrative wiring of a concrete serial port.

use std::io::{Read, Write};
use std::time::Duration;

use log::LevelFilter;
use serialport::SerialPort;

use mdfu::image_reader::ImageReader;
use mdfu::image_writer::ImageWriter;
use mdfu::mac::Mac;
use mdfu::transport::{make_transport, TransportKind};
use mdfu::Session;

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() {
    match main_body() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn main_body() -> CliResult<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = Options::parse(&args)?;

    let mac = SerialPortMac::open(&options.port, options.baud_rate)?;
    let transport = make_transport(options.tool, mac);
    let mut session = Session::new(transport, options.retries);
    session.open()?;

    let mut pending_close = PendingClose::None;
    let outcome = dispatch(&mut session, &options, &mut pending_close);

    // Close the transport/session before the image reader or writer, so a
    // session still mid-transfer never finds its backing file already gone.
    let session_close = session.close();
    let image_close = pending_close.close();

    outcome?;
    session_close.map_err(Into::into)?;
    image_close
}

/// An image reader/writer opened by [`dispatch`] but not yet closed, carried
/// back out to [`main_body`] so it closes after the session does.
enum PendingClose {
    None,
    Reader(FileImageReader),
    Writer(FileImageWriter),
}

impl PendingClose {
    fn close(&mut self) -> CliResult<()> {
        match std::mem::replace(self, PendingClose::None) {
            PendingClose::None => Ok(()),
            PendingClose::Reader(mut reader) => reader.close().map_err(Into::into),
            PendingClose::Writer(mut writer) => writer.close().map_err(Into::into),
        }
    }
}

fn dispatch(
    session: &mut Session,
    options: &Options,
    pending_close: &mut PendingClose,
) -> CliResult<()> {
    match options.action {
        Action::Update => {
            let path = options
                .image
                .as_deref()
                .ok_or("update requires --image <path>")?;
            let mut reader = FileImageReader::default();
            reader.open(path)?;
            let outcome = session.run_update(&mut reader);
            *pending_close = PendingClose::Reader(reader);
            outcome.map_err(Into::into)
        }
        Action::ClientInfo => {
            let info = session.get_client_info()?;
            print!("{info}");
            Ok(())
        }
        Action::Dump => {
            let path = options
                .image
                .as_deref()
                .ok_or("dump requires --image <path>")?;
            let mut writer = FileImageWriter::default();
            writer.open(path)?;
            let outcome = session.run_dump(&mut writer);
            *pending_close = PendingClose::Writer(writer);
            outcome.map_err(Into::into)
        }
        Action::ChangeMode => session.run_change_mode().map_err(Into::into),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Update,
    ClientInfo,
    Dump,
    ChangeMode,
}

struct Options {
    action: Action,
    tool: TransportKind,
    port: String,
    baud_rate: u32,
    image: Option<String>,
    retries: u32,
}

impl Options {
    /// Hand-rolled flag parsing, in the spirit of the upstream `main.rs`'s
    /// `std::env::args_os`-based argument handling: no external CLI crate,
    /// just enough to drive a session from a terminal.
    fn parse(args: &[String]) -> CliResult<Self> {
        let mut args = args.iter();
        let action = match args.next().map(String::as_str) {
            Some("update") => Action::Update,
            Some("client-info") => Action::ClientInfo,
            Some("dump") => Action::Dump,
            Some("change-mode") => Action::ChangeMode,
            Some(other) => return Err(format!("unknown action '{other}'").into()),
            None => return Err("missing action (update, client-info, dump, change-mode)".into()),
        };

        let mut tool = TransportKind::Serial;
        let mut port = None;
        let mut baud_rate = 115_200;
        let mut image = None;
        let mut retries = mdfu::DEFAULT_RETRIES;

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--tool" => {
                    tool = match args.next().map(String::as_str) {
                        Some("serial") => TransportKind::Serial,
                        Some("spi") => TransportKind::Spi,
                        Some("i2c") => TransportKind::I2c,
                        Some(other) => return Err(format!("unknown tool '{other}'").into()),
                        None => return Err("--tool requires a value".into()),
                    };
                }
                "--port" => port = Some(args.next().ok_or("--port requires a value")?.clone()),
                "--baud" => {
                    baud_rate = args
                        .next()
                        .ok_or("--baud requires a value")?
                        .parse()
                        .map_err(|_| "--baud must be a number")?
                }
                "--image" => image = Some(args.next().ok_or("--image requires a value")?.clone()),
                "--retries" => {
                    retries = args
                        .next()
                        .ok_or("--retries requires a value")?
                        .parse()
                        .map_err(|_| "--retries must be a number")?
                }
                other => return Err(format!("unknown flag '{other}'").into()),
            }
        }

        if tool != TransportKind::Serial {
            return Err(
                "only --tool serial is wired to a concrete MAC in this build; \
                 SPI and I2C need their own spidev/i2cdev-backed Mac implementation"
                    .into(),
            );
        }

        Ok(Options {
            action,
            tool,
            port: port.ok_or("--port is required")?,
            baud_rate,
            image,
            retries,
        })
    }
}

/// Illustrative serial `Mac`: a short-timeout serial port where a timed-out
/// read reports zero bytes rather than an error, so a MAC read always
/// returns promptly.
struct SerialPortMac {
    port: Box<dyn SerialPort>,
}

impl SerialPortMac {
    fn open(path: &str, baud_rate: u32) -> CliResult<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self { port })
    }
}

impl Mac for SerialPortMac {
    fn open(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        match self.port.read(out) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }
}

/// Illustrative file-backed image reader; the library treats this as an
/// external collaborator and only specifies the trait.
#[derive(Default)]
struct FileImageReader {
    file: Option<std::fs::File>,
}

impl ImageReader for FileImageReader {
    fn open(&mut self, path: &str) -> std::io::Result<()> {
        self.file = Some(std::fs::File::open(path)?);
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file
            .as_mut()
            .expect("image reader used before open")
            .read(buf)
    }
}

/// Illustrative file-backed image writer, used by `dump` to persist the
/// negotiated client parameters.
#[derive(Default)]
struct FileImageWriter {
    file: Option<std::fs::File>,
}

impl ImageWriter for FileImageWriter {
    fn open(&mut self, path: &str) -> std::io::Result<()> {
        self.file = Some(std::fs::File::create(path)?);
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.file = None;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file
            .as_mut()
            .expect("image writer used before open")
            .write(buf)
    }
}
