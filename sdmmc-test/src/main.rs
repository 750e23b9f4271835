use std::{fs, time};

use clap::{Parser, ValueEnum};
use mbr_nostd::{MasterBootRecord, PartitionTable};
use pretty_hex::pretty_hex;
use sdmmc::bus::{sdmmc::Bus, sim};
use sdmmc::config::Config;
use sdmmc::SD;
use size::Size;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CardKind {
    /// SD v1.x, byte addressed
    Legacy,
    /// SD v2, byte addressed
    Standard,
    /// SDHC/SDXC, block addressed
    High,
}

impl From<CardKind> for sim::Kind {
    fn from(kind: CardKind) -> Self {
        match kind {
            CardKind::Legacy => Self::Legacy,
            CardKind::Standard => Self::StandardCapacity,
            CardKind::High => Self::HighCapacity,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Disk image backing the emulated card
    #[clap(short, long, value_parser)]
    image: Option<String>,

    /// Kind of card to emulate
    #[clap(short, long, value_enum, default_value = "high")]
    kind: CardKind,

    /// Block to dump
    #[clap(short, long, value_parser, default_value_t = 0)]
    block: u32,

    /// Switch to 4-line bus after init
    #[clap(short, long)]
    wide: bool,

    /// Increase log verbosity
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct CountDown(time::Instant);

impl Default for CountDown {
    fn default() -> Self {
        Self(time::Instant::now())
    }
}

impl embedded_hal::timer::CountDown for CountDown {
    type Time = core::time::Duration;

    fn start<T: Into<core::time::Duration>>(&mut self, duration: T) {
        self.0 = time::Instant::now() + duration.into();
    }

    fn wait(&mut self) -> nb::Result<(), void::Void> {
        match time::Instant::now() > self.0 {
            true => Ok(()),
            false => Err(nb::Error::WouldBlock),
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let card = match &args.image {
        Some(path) => {
            let image = fs::read(path).map_err(|e| format!("{}: {}", path, e))?;
            sim::SimulatedCard::with_image(args.kind.into(), image)
        }
        None => sim::SimulatedCard::new(args.kind.into()),
    };
    let config = Config { wide_bus: args.wide, ..Default::default() };
    let mut sd = SD::new(Bus::with_config(card, CountDown::default(), config));
    sd.initialize(&mut sdmmc::delay::std::Delay).map_err(|e| format!("{:?}", e))?;
    println!("Card: {:?}", sd.card());
    let size = Size::from_bytes(sd.num_blocks() as u64 * sd.block_size() as u64);
    println!("num-blocks {} ({})", sd.num_blocks(), size);

    let mut buffer = [0u8; 512];
    sd.read(args.block, &mut buffer).map_err(|e| format!("{:?}", e))?;
    println!("Block {}:\n{}", args.block, pretty_hex(&buffer));

    if args.block != 0 {
        sd.read(0, &mut buffer).map_err(|e| format!("{:?}", e))?;
    }
    match MasterBootRecord::from_bytes(&buffer) {
        Ok(mbr) => {
            for partition in mbr.partition_table_entries().iter() {
                println!("{:?}", partition);
            }
        }
        Err(e) => println!("No MBR: {:?}", e),
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
    match run(args) {
        Ok(_) => (),
        Err(e) => println!("{}", e),
    };
}
