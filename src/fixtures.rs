//! Synthetic files for benchmark runs.
//!
//! Each generated file repeats a line of text until it reaches at least the
//! requested size. Generation is spread over several threads: one per 200
//! files, capped at the number of CPUs.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files handled by one generator thread before another is added.
const FILES_PER_THREAD: usize = 200;

/// Length of generated file names.
const NAME_LEN: usize = 16;

/// Number of `text` lines needed to reach `file_size` bytes.
pub fn lines_for_size(file_size: usize, text_len: usize) -> usize {
    if text_len == 0 {
        return 0;
    }
    file_size.div_ceil(text_len)
}

/// How generation work is divided between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSplit {
    pub threads: usize,
    pub files_per_thread: usize,
}

/// Split `file_count` files across threads, never using more than `cpus`.
pub fn split_work(file_count: usize, cpus: usize) -> WorkSplit {
    let cpus = cpus.max(1);
    let threads = file_count / FILES_PER_THREAD;

    if threads > cpus {
        WorkSplit {
            threads: cpus,
            files_per_thread: file_count / cpus,
        }
    } else if threads == 0 {
        WorkSplit {
            threads: 1,
            files_per_thread: file_count,
        }
    } else {
        WorkSplit {
            threads,
            files_per_thread: FILES_PER_THREAD,
        }
    }
}

/// Write `count` files of at least `file_size` bytes into `dir`.
///
/// Returns the paths written.
pub fn generate_files(
    dir: &Path,
    text: &str,
    file_size: usize,
    count: usize,
) -> io::Result<Vec<PathBuf>> {
    if text.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "file text must not be empty",
        ));
    }

    std::fs::create_dir_all(dir)?;

    let split = split_work(count, num_cpus());
    let lines = lines_for_size(file_size, text.len());

    info!(
        dir = %dir.display(),
        count,
        file_size,
        threads = split.threads,
        "Generating files"
    );

    let results: Vec<io::Result<Vec<PathBuf>>> = std::thread::scope(|scope| {
        let mut left = count;
        let handles: Vec<_> = (0..split.threads)
            .map(|idx| {
                let batch = if idx == split.threads - 1 {
                    left
                } else {
                    split.files_per_thread
                };
                left -= batch;
                scope.spawn(move || {
                    (0..batch)
                        .map(|_| write_file(dir, text, lines))
                        .collect::<io::Result<Vec<_>>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("generator thread panicked")))
            })
            .collect()
    });

    let mut paths = Vec::with_capacity(count);
    for batch in results {
        paths.extend(batch?);
    }
    Ok(paths)
}

/// Remove everything inside `dir`, keeping the directory itself.
pub fn clean_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "Directory cleaned");
    Ok(removed)
}

fn write_file(dir: &Path, text: &str, lines: usize) -> io::Result<PathBuf> {
    loop {
        let path = dir.join(random_name());
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        let mut writer = BufWriter::new(file);
        for line in 0..lines {
            writer.write_all(text.as_bytes())?;
            if line + 1 < lines {
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        return Ok(path);
    }
}

fn random_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_LEN)
        .map(char::from)
        .collect()
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
