//! # PeriPage CLI
//!
//! Command-line interface for PeriPage thermal printers.
//!
//! ## Usage
//!
//! ```bash
//! # Print a line of text with a trailing paper feed
//! peripage print -m 00:15:83:15:BC:5F -p a6p -b 60 -t "Hello"
//!
//! # Print stdin line by line
//! dmesg | tail | peripage print -m 00:15:83:15:BC:5F -p a6 -s
//!
//! # Print an image or a QR code, hotter
//! peripage print -m 00:15:83:15:BC:5F -p a6 -c 2 -i cat.png
//! peripage print -m 00:15:83:15:BC:5F -p a6 --dither atkinson -i cat.png
//! peripage print -m 00:15:83:15:BC:5F -p a6 -q "https://example.com"
//!
//! # Text in the bitmap font rather than the printer's own
//! peripage print -m 00:15:83:15:BC:5F -p a6 --bitmap -t "Hello"
//!
//! # Ask the printer to introduce itself
//! peripage print -m 00:15:83:15:BC:5F -p a6 -e
//!
//! # Run the HTTP print server
//! peripage serve -m 00:15:83:15:BC:5F -p a6p --secret hunter2
//! ```

use clap::{Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

use peripage::{
    DeviceSession, PeripageError,
    printer::ProfileId,
    render::DitheringAlgorithm,
    server::{self, DEFAULT_BREAK_SIZE, ServerConfig},
    service::ServiceConfig,
    transport::RfcommConnector,
};

/// PeriPage - Bluetooth thermal printer utility
#[derive(Parser, Debug)]
#[command(name = "peripage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print once and disconnect
    Print {
        /// Bluetooth MAC address of the printer, or an RFCOMM tty path
        #[arg(short = 'm', long = "mac")]
        address: String,

        /// Printer model
        #[arg(short, long = "printer", value_enum)]
        profile: ProfileId,

        /// Concentration (print temperature)
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
        concentration: u8,

        /// Paper feed after the printed content, in dots
        #[arg(short = 'b', long = "break", default_value_t = 0)]
        break_size: u8,

        /// How images and QR codes are reduced to black and white
        #[arg(long, value_enum, default_value_t = DitheringAlgorithm::default())]
        dither: DitheringAlgorithm,

        /// Render text and stdin with the bitmap font instead of ASCII mode
        #[arg(long)]
        bitmap: bool,

        #[command(flatten)]
        content: Content,
    },

    /// Run the HTTP print server
    Serve {
        /// Bluetooth MAC address of the printer, or an RFCOMM tty path
        #[arg(short = 'm', long = "mac")]
        address: String,

        /// Printer model
        #[arg(short, long = "printer", value_enum)]
        profile: ProfileId,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:11001")]
        listen: String,

        /// Reject requests without this `secret` query parameter
        #[arg(long)]
        secret: Option<String>,

        /// Paper feed for `print_break=1`, in dots
        #[arg(long, default_value_t = DEFAULT_BREAK_SIZE)]
        break_size: u8,

        /// Archive received text and images into this directory
        #[arg(long, value_name = "DIR")]
        receive_dir: Option<PathBuf>,

        /// How uploaded images are reduced to black and white
        #[arg(long, value_enum, default_value_t = DitheringAlgorithm::default())]
        dither: DitheringAlgorithm,

        /// Seconds between keep-alive battery queries
        #[arg(long, default_value_t = 60.0)]
        ping_interval: f64,

        /// Minimum seconds between print tasks
        #[arg(long, default_value_t = 1.0)]
        task_interval: f64,

        /// Seconds to wait before reconnecting after a link failure
        #[arg(long, default_value_t = 5.0)]
        reconnect_wait: f64,

        /// Seconds to let the printer settle after connecting
        #[arg(long, default_value_t = 1.0)]
        post_connect_wait: f64,
    },
}

/// What to print; exactly one is required.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Content {
    /// ASCII text to print; other characters are dropped
    #[arg(short, long)]
    text: Option<String>,

    /// Print stdin line by line until EOF
    #[arg(short, long)]
    stream: bool,

    /// Path to an image to print
    #[arg(short, long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Text to encode as a QR code
    #[arg(short, long)]
    qr: Option<String>,

    /// Ask the printer to introduce itself
    #[arg(short = 'e', long)]
    introduce: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), PeripageError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Print {
            address,
            profile,
            concentration,
            break_size,
            dither,
            bitmap,
            content,
        } => {
            let mut session =
                DeviceSession::new(RfcommConnector::default(), address, profile).with_dithering(dither);
            session.connect()?;
            let result = print_content(&mut session, concentration, break_size, bitmap, content);
            session.disconnect();
            result
        }
        Commands::Serve {
            address,
            profile,
            listen,
            secret,
            break_size,
            receive_dir,
            dither,
            ping_interval,
            task_interval,
            reconnect_wait,
            post_connect_wait,
        } => {
            if let Some(dir) = &receive_dir {
                std::fs::create_dir_all(dir)?;
            }

            let mut config = ServerConfig::new(address, profile);
            config.listen_addr = listen;
            config.secret = secret;
            config.break_size = break_size;
            config.receive_dir = receive_dir;
            config.dithering = dither;
            config.service =
                ServiceConfig::from_secs(ping_interval, task_interval, reconnect_wait, post_connect_wait);

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(config))
        }
    }
}

/// Run one print job on a connected session.
fn print_content(
    session: &mut DeviceSession<RfcommConnector>,
    concentration: u8,
    break_size: u8,
    bitmap: bool,
    content: Content,
) -> Result<(), PeripageError> {
    session.reset()?;

    if content.introduce {
        let info = session.device_info()?;
        println!("Name:       {}", info.name);
        println!("MAC:        {}", info.mac);
        println!("Client MAC: {}", info.client_mac);
        println!("Firmware:   {}", info.firmware);
        println!("Serial:     {}", info.serial);
        println!("Battery:    {}%", info.battery);
        return Ok(());
    }

    session.set_concentration(concentration)?;

    if let Some(text) = content.text {
        let text = text.trim_end();
        if bitmap && !text.is_empty() {
            session.print_text_raster(text)?;
        } else if !text.is_empty() {
            session.print_ascii(text)?;
            session.flush_ascii()?;
        }
    } else if content.stream {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            if bitmap {
                session.print_text_raster(line.trim_end())?;
            } else {
                session.println_ascii(line.trim_end())?;
            }
        }
    } else if let Some(path) = content.image {
        let img = image::open(&path).map_err(|e| {
            PeripageError::Image(format!("Failed to open image {}: {}", path.display(), e))
        })?;
        let rows = session.print_image(&img)?;
        tracing::info!(rows, "Printed image");
    } else if let Some(qr) = content.qr {
        session.print_qr(&qr)?;
    }

    if break_size > 0 {
        session.print_break(break_size)?;
    }
    Ok(())
}
