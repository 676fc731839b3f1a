//! Content packaging: a deterministic UnixFS DAG over a source file, sealed
//! into a CARv2 archive.
//!
//! The DAG is built twice. The first pass runs against an in-memory store and
//! yields the root that the archive header needs. The second pass streams the
//! same source into the file-backed store. Both passes must agree on the root,
//! otherwise the archive is discarded with [`PackError::Integrity`].

pub mod blockstore;
pub mod car;
pub mod layout;
pub mod unixfs;

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use rand::Rng;
use tempfile::TempPath;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use self::blockstore::MemoryBlockStore;
use self::car::CarBlockStore;
pub use self::layout::DagParams;
use crate::models::cid::Cid;

const READ_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Never retried: the layout is nondeterministic or the input changed
    /// between passes.
    #[error("integrity fault: staged root {staged} differs from sealed root {sealed}")]
    Integrity { staged: Cid, sealed: Cid },

    #[error("invalid packaging input: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A sealed archive named `<root>.car`.
///
/// The file is removed when this is dropped unless the caller keeps the path.
#[derive(Debug)]
pub struct PackedArchive {
    pub root: Cid,
    pub path: TempPath,
}

/// Package the file at `source` into a CARv2 archive inside `dir`.
#[instrument(level = "debug", skip(params))]
pub fn create_dense_car(
    dir: &Path,
    source: &Path,
    params: &DagParams,
) -> Result<PackedArchive, PackError> {
    let len = std::fs::metadata(source)?.len();
    if len == 0 {
        return Err(PackError::Input(format!(
            "source {} is empty",
            source.display()
        )));
    }
    pack_with(dir, params, || {
        File::open(source).map(|f| BufReader::with_capacity(READ_BUFFER_SIZE, f))
    })
}

/// Two-pass build over whatever `open` yields. `open` is called once per pass.
fn pack_with<R, F>(dir: &Path, params: &DagParams, mut open: F) -> Result<PackedArchive, PackError>
where
    R: Read,
    F: FnMut() -> io::Result<R>,
{
    params.validate().map_err(PackError::Input)?;

    let mut staging = MemoryBlockStore::new();
    let staged = layout::build_dag(open()?, &mut staging, params)?;
    debug!(root = %staged, blocks = staging.len(), "staged dag");
    drop(staging);

    let archive = tempfile::Builder::new()
        .prefix("archive")
        .suffix(".car")
        .tempfile_in(dir)?
        .into_temp_path();

    let mut sealed_store = CarBlockStore::create(&archive, &[staged])?;
    let sealed = layout::build_dag(open()?, &mut sealed_store, params)?;
    sealed_store.finalize()?;

    if sealed != staged {
        // `archive` is removed on drop
        return Err(PackError::Integrity { staged, sealed });
    }

    let final_path = dir.join(format!("{}.car", sealed));
    archive.persist(&final_path).map_err(|e| e.error)?;
    info!(root = %sealed, path = %final_path.display(), "packed archive");

    Ok(PackedArchive {
        root: sealed,
        path: TempPath::try_from_path(final_path)?,
    })
}

/// Write `size` random bytes to a fresh `source*.dat` file in `dir`. The file
/// is deleted when the returned path is dropped.
pub fn create_random_file(dir: &Path, size: u64) -> io::Result<TempPath> {
    let (file, path) = tempfile::Builder::new()
        .prefix("source")
        .suffix(".dat")
        .tempfile_in(dir)?
        .into_parts();

    let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, file);
    let mut rng = rand::rng();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        rng.fill(&mut buf[..n]);
        writer.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    writer.flush()?;

    debug!(path = %path.display(), size, "wrote random source");
    Ok(path)
}
