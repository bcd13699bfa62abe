//! One-shot transport of a worker's aggregate to the coordinator.
//!
//! Each worker gets its own channel instance. The worker calls `send` exactly
//! once before it finishes; the coordinator calls `receive` only after the
//! worker has been joined, so there is never a concurrent access window.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::codec;
use crate::error::ChannelError;
use crate::stats::Aggregate;

/// Default per-worker payload limit (64 MiB).
pub const DEFAULT_CAPACITY: u64 = 64 * 1024 * 1024;

pub trait ResultChannel: Send {
    fn worker_id(&self) -> usize;

    /// Worker side. Fails if the payload exceeds capacity or a result was
    /// already sent.
    fn send(&mut self, aggregate: &Aggregate) -> Result<(), ChannelError>;

    /// Coordinator side. Consumes the result; a second call reports `Empty`.
    fn receive(&mut self) -> Result<Aggregate, ChannelError>;
}

/// Creates the channel instance owned by one worker.
pub trait ChannelFactory: Sync {
    fn open(&self, worker_id: usize) -> Result<Box<dyn ResultChannel>, ChannelError>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChannelBackend {
    /// Bounded in-process channel per worker
    #[default]
    Memory,
    /// Run-scoped temporary file per worker
    TempFile,
}

impl ChannelBackend {
    /// Builds the factory for one run. `temp_root` only matters for
    /// [`ChannelBackend::TempFile`]; `None` uses the system temp directory.
    pub fn factory(self, capacity: u64, temp_root: Option<&Path>) -> Result<Box<dyn ChannelFactory>, ChannelError> {
        match self {
            ChannelBackend::Memory => Ok(Box::new(MemoryChannels::new(capacity))),
            ChannelBackend::TempFile => Ok(Box::new(TempFileChannels::new(capacity, temp_root)?)),
        }
    }
}

pub struct MemoryChannels {
    capacity: u64,
}

impl MemoryChannels {
    pub fn new(capacity: u64) -> Self {
        Self { capacity }
    }
}

impl ChannelFactory for MemoryChannels {
    fn open(&self, worker_id: usize) -> Result<Box<dyn ResultChannel>, ChannelError> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        Ok(Box::new(MemoryChannel {
            worker_id,
            capacity: self.capacity,
            sender,
            receiver,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryChannel {
    worker_id: usize,
    capacity: u64,
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
}

impl ResultChannel for MemoryChannel {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn send(&mut self, aggregate: &Aggregate) -> Result<(), ChannelError> {
        let framed = codec::frame(aggregate, self.capacity)?;
        let size = framed.len();
        self.sender.try_send(framed).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::AlreadySent,
            TrySendError::Disconnected(_) => ChannelError::Empty,
        })?;
        debug!(action = "send", component = "memory_channel", worker = self.worker_id, bytes = size, "Result sent");
        Ok(())
    }

    fn receive(&mut self) -> Result<Aggregate, ChannelError> {
        let framed = self.receiver.try_recv().map_err(|e| match e {
            TryRecvError::Empty | TryRecvError::Disconnected => ChannelError::Empty,
        })?;
        codec::unframe(&framed)
    }
}

/// Channels backed by `worker-<i>.bin` files in a directory that lives
/// exactly as long as the factory.
pub struct TempFileChannels {
    capacity: u64,
    dir: TempDir,
}

impl TempFileChannels {
    pub fn new(capacity: u64, temp_root: Option<&Path>) -> Result<Self, ChannelError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("visitagg-");
        let dir = match temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        info!(action = "create", component = "temp_file_channel", dir = ?dir.path(), "Created run-scoped channel directory");
        Ok(Self { capacity, dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl ChannelFactory for TempFileChannels {
    fn open(&self, worker_id: usize) -> Result<Box<dyn ResultChannel>, ChannelError> {
        Ok(Box::new(TempFileChannel {
            worker_id,
            capacity: self.capacity,
            path: self.dir.path().join(format!("worker-{worker_id}.bin")),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "temp-file"
    }
}

pub struct TempFileChannel {
    worker_id: usize,
    capacity: u64,
    path: PathBuf,
}

impl ResultChannel for TempFileChannel {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn send(&mut self, aggregate: &Aggregate) -> Result<(), ChannelError> {
        let framed = codec::frame(aggregate, self.capacity)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(ChannelError::AlreadySent),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&framed)?;
        file.sync_all()?;
        debug!(action = "send", component = "temp_file_channel", worker = self.worker_id, bytes = framed.len(), path = ?self.path, "Result written");
        Ok(())
    }

    fn receive(&mut self) -> Result<Aggregate, ChannelError> {
        let framed = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ChannelError::Empty),
            Err(e) => return Err(e.into()),
        };
        fs::remove_file(&self.path)?;
        codec::unframe(&framed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Aggregate {
        let mut aggregate = Aggregate::new();
        aggregate.add("/index.html".to_string(), "2024-03-01".to_string(), 2);
        aggregate.add("/about.html".to_string(), "2024-03-02".to_string(), 1);
        aggregate
    }

    fn exercise(factory: &dyn ChannelFactory) {
        let mut channel = factory.open(3).unwrap();
        assert_eq!(channel.worker_id(), 3);
        channel.send(&sample()).unwrap();
        assert!(matches!(channel.send(&sample()), Err(ChannelError::AlreadySent)));
        assert_eq!(channel.receive().unwrap(), sample());
        assert!(matches!(channel.receive(), Err(ChannelError::Empty)));
    }

    #[test]
    fn test_memory_channel_is_write_once_read_once() {
        exercise(&MemoryChannels::new(DEFAULT_CAPACITY));
    }

    #[test]
    fn test_temp_file_channel_is_write_once_read_once() {
        let root = tempfile::tempdir().unwrap();
        let channels = TempFileChannels::new(DEFAULT_CAPACITY, Some(root.path())).unwrap();
        exercise(&channels);
        assert_eq!(fs::read_dir(channels.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_temp_file_directory_removed_with_factory() {
        let root = tempfile::tempdir().unwrap();
        let channels = TempFileChannels::new(DEFAULT_CAPACITY, Some(root.path())).unwrap();
        let mut channel = channels.open(0).unwrap();
        channel.send(&sample()).unwrap();
        drop(channel);
        drop(channels);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_oversized_payload_fails_send() {
        for backend in [ChannelBackend::Memory, ChannelBackend::TempFile] {
            let factory = backend.factory(8, None).unwrap();
            let mut channel = factory.open(0).unwrap();
            let err = channel.send(&sample()).unwrap_err();
            assert!(matches!(err, ChannelError::PayloadTooLarge { capacity: 8, .. }));
            assert!(matches!(channel.receive(), Err(ChannelError::Empty)));
        }
    }
}
