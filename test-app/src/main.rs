// netsdr test application -- CLI tool for exercising the NetSDR client
// against a real receiver or the built-in mock device.
//
// Usage:
//   netsdr-test-app --host 192.168.1.50 connect
//   netsdr-test-app --host 192.168.1.50 freq 14074000 --channel 0
//   netsdr-test-app --host 192.168.1.50 --sample-width 24 iq --duration 10 --freq 7074000
//   netsdr-test-app --mock -vv iq --duration 3

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use netsdr_client::codec::encode_data_frame;
use netsdr_client::{ClientEvent, IqBuffer, NetSdrClient, NetSdrClientBuilder, SampleSink};
use netsdr_core::MessageType;
use netsdr_test_harness::MockNetSdrDevice;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// netsdr test application -- drives a NetSDR receiver from the command line.
#[derive(Parser)]
#[command(name = "netsdr-test-app", version, about)]
struct Cli {
    /// Receiver IP address or hostname.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Receiver TCP control port.
    #[arg(long, default_value_t = 50000)]
    tcp_port: u16,

    /// Local UDP port for IQ data.
    #[arg(long, default_value_t = 60000)]
    udp_port: u16,

    /// IQ sample width in bits (16 or 24).
    #[arg(long, default_value_t = 16)]
    sample_width: u16,

    /// Run against a local mock receiver instead of real hardware.
    /// --host and --tcp-port are ignored.
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print the client status, and disconnect.
    Connect,

    /// Tune a receiver channel.
    Freq {
        /// Frequency in Hz.
        freq_hz: u64,
        /// Receiver channel.
        #[arg(long, default_value_t = 0)]
        channel: u8,
    },

    /// Stream IQ data and print per-second statistics.
    Iq {
        /// Streaming duration in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,
        /// Tune channel 0 to this frequency (Hz) before streaming.
        #[arg(long)]
        freq: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format a frequency in Hz as a human-readable MHz string.
fn format_freq(hz: u64) -> String {
    let mhz = hz as f64 / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

fn log_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn validate_options(cli: &Cli) -> Result<()> {
    if cli.sample_width != 16 && cli.sample_width != 24 {
        bail!(
            "--sample-width must be 16 or 24 (got {})",
            cli.sample_width
        );
    }
    if let Command::Iq { duration: 0, .. } = cli.command {
        bail!("--duration must be at least 1 second");
    }
    Ok(())
}

fn create_client(
    cli: &Cli,
    device: Option<&MockNetSdrDevice>,
    sink: Option<Arc<dyn SampleSink>>,
) -> Result<NetSdrClient> {
    let mut builder = NetSdrClientBuilder::new()
        .udp_port(cli.udp_port)
        .sample_width(cli.sample_width);

    builder = match device {
        Some(device) => builder.host("127.0.0.1").tcp_port(device.port()),
        None => builder.host(&cli.host).tcp_port(cli.tcp_port),
    };
    if let Some(sink) = sink {
        builder = builder.sample_sink(sink);
    }

    builder.build().context("failed to configure client")
}

async fn connect(client: &NetSdrClient, cli: &Cli, mock: bool) -> Result<()> {
    client.connect().await.with_context(|| {
        if mock {
            "failed to connect to mock receiver".to_string()
        } else {
            format!("failed to connect to {}:{}", cli.host, cli.tcp_port)
        }
    })?;

    if mock {
        println!("Connected (mock receiver)");
    } else {
        println!("Connected to {}:{}", cli.host, cli.tcp_port);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Synthetic IQ generator (mock mode)
// ---------------------------------------------------------------------------

/// Samples per synthetic data item.
const SYNTHETIC_SAMPLES_PER_FRAME: usize = 256;

/// Interval between synthetic data items.
const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(10);

/// Build one DataItem1 frame of noisy samples at the given width.
fn synthetic_frame(rng: &mut StdRng, sample_width: u16) -> Result<Vec<u8>> {
    let width_bytes = usize::from(sample_width / 8);
    let max = (1i32 << (sample_width - 1)) - 1;
    let amplitude = max / 4;

    let mut body = Vec::with_capacity(SYNTHETIC_SAMPLES_PER_FRAME * width_bytes);
    for _ in 0..SYNTHETIC_SAMPLES_PER_FRAME {
        let sample: i32 = rng.gen_range(-amplitude..=amplitude);
        body.extend_from_slice(&sample.to_le_bytes()[..width_bytes]);
    }

    Ok(encode_data_frame(MessageType::DataItem1, &body)?)
}

/// Spawn a task feeding synthetic data items to the client's UDP port.
fn spawn_generator(
    device: Arc<MockNetSdrDevice>,
    udp_port: u16,
    sample_width: u16,
) -> JoinHandle<()> {
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, udp_port));

    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut interval = tokio::time::interval(SYNTHETIC_FRAME_INTERVAL);

        loop {
            interval.tick().await;
            let frame = match synthetic_frame(&mut rng, sample_width) {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build synthetic frame");
                    return;
                }
            };
            if let Err(e) = device.send_datagram(target, &frame).await {
                tracing::warn!(error = %e, "Failed to send synthetic datagram");
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_connect(client: &NetSdrClient) -> Result<()> {
    println!("Client Status");
    println!("  State:          {}", client.state());
    println!("  Connected:      {}", client.is_connected());
    println!("  IQ started:     {}", client.iq_started());
    println!("  Sample rate:    {} Hz", client.sample_rate());
    println!("  Sample width:   {} bits", client.sample_width());
    Ok(())
}

async fn cmd_freq(client: &NetSdrClient, freq_hz: u64, channel: u8) -> Result<()> {
    client
        .change_frequency(freq_hz, channel)
        .await
        .context("invalid frequency")?;
    println!("Channel {channel}: set to {}", format_freq(freq_hz));
    Ok(())
}

/// Running statistics for one reporting interval.
#[derive(Default)]
struct IqStats {
    buffers: u64,
    samples: u64,
    min: i32,
    max: i32,
    sum_squares: f64,
}

impl IqStats {
    fn add(&mut self, buffer: &IqBuffer) {
        if self.samples == 0 {
            self.min = i32::MAX;
            self.max = i32::MIN;
        }
        self.buffers += 1;
        for &s in &buffer.samples {
            self.samples += 1;
            self.min = self.min.min(s);
            self.max = self.max.max(s);
            self.sum_squares += f64::from(s) * f64::from(s);
        }
    }

    fn rms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            (self.sum_squares / self.samples as f64).sqrt()
        }
    }
}

async fn cmd_iq(
    client: &NetSdrClient,
    rx: &mut mpsc::Receiver<IqBuffer>,
    duration_secs: u64,
    freq: Option<u64>,
) -> Result<()> {
    if let Some(freq_hz) = freq {
        cmd_freq(client, freq_hz, 0).await?;
    }

    let mut events = client.subscribe();
    client.start_iq().await.context("failed to start IQ stream")?;
    println!("Streaming IQ for {duration_secs} s...");

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut report = tokio::time::interval(Duration::from_secs(1));
    report.tick().await;

    let mut stats = IqStats::default();
    let mut total_samples = 0u64;
    let mut second = 0u64;

    loop {
        if Instant::now() >= deadline {
            break;
        }

        tokio::select! {
            buffer = rx.recv() => match buffer {
                Some(buffer) => stats.add(&buffer),
                None => break,
            },
            _ = report.tick() => {
                second += 1;
                if stats.samples == 0 {
                    println!("[{second:>3}s] no data");
                } else {
                    println!(
                        "[{second:>3}s] {} buffers, {} samples, min {}, max {}, rms {:.1}",
                        stats.buffers,
                        stats.samples,
                        stats.min,
                        stats.max,
                        stats.rms()
                    );
                }
                total_samples += stats.samples;
                stats = IqStats::default();
            }
            event = events.recv() => {
                if let Ok(ClientEvent::Disconnected) = event {
                    println!("Receiver disconnected.");
                    break;
                }
            }
        }
    }

    total_samples += stats.samples;
    client.stop_iq().await.context("failed to stop IQ stream")?;
    println!("Stopped. {total_samples} samples received.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .init();

    validate_options(&cli)?;

    let device = if cli.mock {
        Some(Arc::new(
            MockNetSdrDevice::start()
                .await
                .context("failed to start mock receiver")?,
        ))
    } else {
        None
    };

    let (sample_tx, mut sample_rx) = mpsc::channel::<IqBuffer>(256);
    let sink: Option<Arc<dyn SampleSink>> = match cli.command {
        Command::Iq { .. } => Some(Arc::new(sample_tx) as Arc<dyn SampleSink>),
        _ => None,
    };

    let client = create_client(&cli, device.as_deref(), sink)?;
    connect(&client, &cli, cli.mock).await?;

    let generator = match (&device, &cli.command) {
        (Some(device), Command::Iq { .. }) => Some(spawn_generator(
            Arc::clone(device),
            cli.udp_port,
            cli.sample_width,
        )),
        _ => None,
    };

    let result = match &cli.command {
        Command::Connect => cmd_connect(&client).await,
        Command::Freq { freq_hz, channel } => cmd_freq(&client, *freq_hz, *channel).await,
        Command::Iq { duration, freq } => cmd_iq(&client, &mut sample_rx, *duration, *freq).await,
    };

    if let Some(generator) = generator {
        generator.abort();
    }
    client.disconnect().await;
    println!("Disconnected.");

    result
}
