use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use zlines::{Store, StoreOptions};

#[derive(Parser)]
#[command(name = "zlines", version = "2.0.0", about = "Block-compressed random-access line store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a .zlines file from a newline-delimited text file
    Create {
        /// Block content capacity in bytes
        #[arg(short, long)]
        block_size: Option<usize>,
        text_input: PathBuf,
        zlines_output: PathBuf,
    },
    /// Print internal layout: header fields and per-block descriptors
    Details {
        zlines_file: PathBuf,
    },
    /// Compare every line of a text file against a .zlines file
    Verify {
        text_file: PathBuf,
        zlines_file: PathBuf,
    },
    /// Print the lines at the given indices
    Get {
        zlines_file: PathBuf,
        #[arg(required = true, num_args = 1..)]
        idx: Vec<u64>,
    },
    /// Print every line in the store
    Print {
        zlines_file: PathBuf,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("zlines: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Create { block_size, text_input, zlines_output } => {
            let mut options = StoreOptions::default();
            if let Some(size) = block_size {
                options.block_capacity = size;
            }
            let output = zlines_output.to_string_lossy().into_owned();
            let mut store = Store::create(output, options)?;

            let input = std::fs::File::open(&text_input)?;
            let reader = BufReader::new(input);
            let mut count = 0u64;
            for line in reader.lines() {
                store.append_line(line?.as_bytes())?;
                count += 1;
            }
            store.close()?;
            println!(
                "Created: {}  ({} lines, max length {})",
                zlines_output.display(),
                count,
                store.max_line_length()
            );
        }

        Commands::Details { zlines_file } => {
            let path = zlines_file.to_string_lossy().into_owned();
            let store = Store::open(path)?;
            println!("── zlines file ──────────────────────────────────────────");
            println!("  Path            {}", zlines_file.display());
            println!("  Lines           {}", store.line_count());
            println!("  Max line length {}", store.max_line_length());
            println!("  Blocks          {}", store.block_count());
            println!("  Block capacity  {} B", store.block_capacity());
            println!("  Index compressed {}", store.index_compressed());
            println!();
            println!("  ── Block descriptors ────────────────────────────────");
            for i in 0..store.block_count() {
                if let Some(d) = store.block_descriptor(i) {
                    println!(
                        "  [{i:4}] offset={:<10} compressed_len={:<10} decompressed_len={:<10} subindex_compressed={}",
                        d.file_offset,
                        d.compressed_length(),
                        d.decompressed_length,
                        d.has_compressed_subindex(),
                    );
                }
            }
        }

        Commands::Verify { text_file, zlines_file } => {
            let path = zlines_file.to_string_lossy().into_owned();
            let mut store = Store::open(path)?;

            let input = std::fs::File::open(&text_file)?;
            let reader = BufReader::new(input);
            let mut mismatches = 0u32;
            let mut checked = 0u64;

            for (index, line) in reader.lines().enumerate() {
                let expected = line?;
                let index = index as u64;
                match store.get_line(index)? {
                    Some(actual) if actual == expected.as_bytes() => {}
                    Some(actual) => {
                        mismatches += 1;
                        eprintln!(
                            "  mismatch at line {index}: expected {:?}, got {:?}",
                            expected,
                            String::from_utf8_lossy(&actual)
                        );
                    }
                    None => {
                        mismatches += 1;
                        eprintln!("  mismatch at line {index}: expected {:?}, got <missing>", expected);
                    }
                }
                checked += 1;
                if mismatches >= 10 {
                    eprintln!("aborting after 10 mismatches");
                    break;
                }
            }

            if mismatches == 0 && checked == store.line_count() {
                println!("OK: {} lines match", checked);
            } else {
                return Err(format!(
                    "verification failed: {} mismatch(es) in {} checked line(s)",
                    mismatches, checked
                )
                .into());
            }
        }

        Commands::Get { zlines_file, idx } => {
            let path = zlines_file.to_string_lossy().into_owned();
            let mut store = Store::open(path)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for index in idx {
                match store.get_line(index)? {
                    Some(line) => {
                        out.write_all(&line)?;
                        out.write_all(b"\n")?;
                    }
                    None => eprintln!("index {index} out of range (line_count = {})", store.line_count()),
                }
            }
        }

        Commands::Print { zlines_file } => {
            let path = zlines_file.to_string_lossy().into_owned();
            let mut store = Store::open(path)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for index in 0..store.line_count() {
                if let Some(line) = store.get_line(index)? {
                    out.write_all(&line)?;
                    out.write_all(b"\n")?;
                }
            }
        }
    }

    Ok(())
}
