use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use streamcrypt::{DEFAULT_CHUNK_SIZE, HEADER_LEN, OutputFile, Padding, StreamCodec};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct CodecArgs {
    /// Read/write PKCS#5 padded payloads produced by older tools
    #[arg(long)]
    legacy_padding: bool,

    /// Maximum number of bytes read per chunk
    #[arg(
        long,
        value_name = "BYTES",
        env = "STREAMCRYPT_CHUNK_SIZE",
        default_value_t = DEFAULT_CHUNK_SIZE
    )]
    chunk_size: usize,

    /// Overwrite OUTPUT if it exists
    #[arg(short, long)]
    force: bool,
}

impl CodecArgs {
    fn to_codec(&self) -> StreamCodec {
        let padding = if self.legacy_padding {
            Padding::Pkcs5
        } else {
            Padding::None
        };

        StreamCodec::new()
            .with_padding(padding)
            .with_chunk_size(self.chunk_size)
    }
}

#[derive(Debug, Parser)]
#[command(name = "streamcrypt")]
#[command(
    version,
    about = "Encrypt and decrypt files with a passphrase-verified AES stream."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts INPUT into OUTPUT ("-" for stdin/stdout)
    #[command(arg_required_else_help = true)]
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        codec: CodecArgs,
    },

    /// Decrypts INPUT into OUTPUT ("-" for stdin/stdout)
    #[command(arg_required_else_help = true)]
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        codec: CodecArgs,
    },

    /// Checks the password against an encrypted file without decrypting it
    #[command(arg_required_else_help = true)]
    Check { input: PathBuf },

    /// Shows the header of an encrypted file
    #[command(arg_required_else_help = true)]
    Info {
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct InfoReport {
    key_digest: String,
    iv: String,
    header_bytes: usize,
    payload_bytes: u64,
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Runs `op` against OUTPUT, committing the file only if `op` succeeds.
fn write_output<F>(path: &Path, force: bool, op: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> streamcrypt::Result<u64>,
{
    if is_stdio(path) {
        let mut stdout = io::stdout().lock();
        return Ok(op(&mut stdout)?);
    }

    let mut out = OutputFile::create(path, force)?;
    let n = op(&mut out)?;
    out.commit()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(n)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Encrypt {
            input,
            output,
            codec,
        } => {
            let password = auth::read_new_password_with_confirmation(is_stdio(&input))?;
            let mut codec_impl = codec.to_codec();
            let reader = open_input(&input)?;
            let n = write_output(&output, codec.force, |w| {
                codec_impl.encode(reader, w, &password)
            })?;
            info!(bytes = n, "encrypted");
            if !is_stdio(&output) {
                println!("encrypted {} -> {}", input.display(), output.display());
            }
        }
        Commands::Decrypt {
            input,
            output,
            codec,
        } => {
            let password = auth::read_password(is_stdio(&input))?;
            let codec_impl = codec.to_codec();
            let reader = open_input(&input)?;
            let n = write_output(&output, codec.force, |w| {
                codec_impl.decode(reader, w, &password)
            })?;
            info!(bytes = n, "decrypted");
            if !is_stdio(&output) {
                println!("decrypted {} -> {}", input.display(), output.display());
            }
        }
        Commands::Check { input } => {
            let password = auth::read_password(is_stdio(&input))?;
            let reader = open_input(&input)?;
            streamcrypt::verify(reader, &password)?;
            println!("password matches");
        }
        Commands::Info { input, json } => {
            let mut reader = open_input(&input)?;
            let header = streamcrypt::inspect(&mut reader)?;
            let payload_bytes = io::copy(&mut reader, &mut io::sink())?;

            let report = InfoReport {
                key_digest: hex(header.digest()),
                iv: hex(header.iv()),
                header_bytes: HEADER_LEN,
                payload_bytes,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("key digest:  {}", report.key_digest);
                println!("iv:          {}", report.iv);
                println!("header:      {} bytes", report.header_bytes);
                println!("payload:     {} bytes", report.payload_bytes);
            }
        }
    }

    Ok(())
}
