use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use osnma_rx::events::{Event, PrintSubscriber};
use osnma_rx::merkle_tree::MerkleTree;
use osnma_rx::pubkey::PublicKey;
use osnma_rx::reader::{PageEvent, PageReader, Protocol};
use osnma_rx::source::Source;
use osnma_rx::Osnma;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Authenticate Galileo I/NAV data with OSNMA
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input source: filepath, file:path, serial:dev:baudrate or net:ip:port
    /// (stdin when absent).
    #[arg(short = 'i', long)]
    input: Option<String>,
    /// Input protocol.
    #[arg(short = 'p', long, value_enum, default_value_t = ProtocolArg::Sbf)]
    protocol: ProtocolArg,
    /// Path to the ECDSA public key in PEM format.
    #[arg(short = 'k', long)]
    pubkey: Option<PathBuf>,
    /// ID of the public key.
    #[arg(long)]
    pkid: Option<u8>,
    /// Path to a cached DSM-KROOT for hot start.
    #[arg(short = 'r', long)]
    root_key: Option<PathBuf>,
    /// Path to the Merkle tree root file.
    #[arg(short = 'm', long)]
    merkle_tree: Option<PathBuf>,
    /// Process sub-frames with missing pages.
    #[arg(short = 'g', long)]
    allow_gaps: bool,
    /// Save verified DSM-KROOTs to the cache path for later hot starts.
    #[arg(short = 's', long)]
    save_kroot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProtocolArg {
    Sbf,
    Ascii,
}

impl From<ProtocolArg> for Protocol {
    fn from(p: ProtocolArg) -> Protocol {
        match p {
            ProtocolArg::Sbf => Protocol::Sbf,
            ProtocolArg::Ascii => Protocol::Ascii,
        }
    }
}

fn kroot_cache_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache").join("osnma-rx").join("kroot"),
        None => PathBuf::from(".osnma-rx-kroot"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut osnma = Osnma::new(args.allow_gaps);
    osnma.register_subscriber(Box::new(PrintSubscriber::new()));

    if let Some(path) = &args.pubkey {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read public key {}", path.display()))?;
        let pubkey = PublicKey::from_pem(&pem, args.pkid)
            .with_context(|| format!("cannot parse public key {}", path.display()))?;
        osnma.add_pubkey(pubkey);
    }

    if let Some(path) = &args.merkle_tree {
        let tree = MerkleTree::from_file(path)
            .with_context(|| format!("cannot load Merkle tree {}", path.display()))?;
        osnma.set_merkle_tree(tree);
    }

    if args.pubkey.is_none() && args.merkle_tree.is_none() {
        anyhow::bail!("at least either a public key or a Merkle tree must be given");
    }

    if args.save_kroot {
        osnma.set_kroot_cache(kroot_cache_path());
    }

    if let Some(path) = &args.root_key {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                if let Err(e) = osnma.hot_start(&contents) {
                    log::warn!("hot start with {} failed: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("cannot read root key {}: {}", path.display(), e),
        }
    }

    let source = Source::open(args.input.as_deref()).context("cannot open input source")?;
    let mut reader = PageReader::new(source, args.protocol.into());

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("cannot install Ctrl-C handler")?;
    }

    while !interrupted.load(Ordering::SeqCst) {
        match reader.next_event().context("error reading input source")? {
            None => break,
            Some(PageEvent::Page { svn, gst, page }) => osnma.feed_page(svn, gst, &page),
            Some(PageEvent::CrcFail { wn, tow, svid }) => {
                osnma.publish(Event::PageCrcFail { wn, tow, svid })
            }
            Some(PageEvent::PairingFail { wn, tow, svid }) => {
                osnma.publish(Event::PairingFail { wn, tow, svid })
            }
        }
    }

    osnma.flush();
    Ok(())
}
