use std::error::Error;

use clap::Parser;
use cheri_caps::capability::{
    cc256::{Cc256, InMemoryCap256},
    CapFormat,
};

/// Decode four hex words of an in-memory 256-bit capability.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(num_args = 4, required = true)]
    words: Vec<String>,

    #[arg(long, default_value_t = false)]
    tagged: bool,

    /// Reject tagged capabilities with reserved bits set instead of showing them
    #[arg(long, default_value_t = false)]
    checked: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut u64s = [0u64; 4];
    for (word, text) in u64s.iter_mut().zip(&args.words) {
        *word = u64::from_str_radix(text.trim_start_matches("0x"), 16)?;
    }
    let wire = InMemoryCap256::from_words(u64s);

    let cap = if args.checked {
        Cc256::decode_checked(&wire, args.tagged)?
    } else {
        Cc256::decode_bits(&wire, args.tagged)
    };
    println!("{}", cap);
    println!("{:x?}", cap);

    Ok(())
}
