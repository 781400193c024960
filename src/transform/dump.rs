//! Background writer for debug class dumps.
//!
//! [`DumpService`] owns one worker thread fed through an unbounded
//! [`crossbeam_channel`] queue. Loader threads only enqueue; the worker writes each class to
//! `<root>/<package dirs>/<Simple>.class`. Write failures are logged at debug level and
//! otherwise ignored, since dumps are purely diagnostic.
//!
//! [`DumpService::shutdown`] closes the queue and blocks until the worker has written every
//! queued class. Dropping the service does the same.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace};

use crate::{
    transform::DumpSink,
    utils::fs::{class_file_path, write_creating_parents},
    Result,
};

struct DumpJob {
    name: String,
    bytes: Vec<u8>,
}

/// Asynchronous [`DumpSink`] writing below a root directory.
pub struct DumpService {
    root: PathBuf,
    sender: Mutex<Option<Sender<DumpJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DumpService {
    /// Start the worker thread.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the thread could not be spawned.
    pub fn start(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let (sender, receiver) = crossbeam_channel::unbounded();

        let worker_root = root.clone();
        let worker = std::thread::Builder::new()
            .name("classweave-dump".to_string())
            .spawn(move || drain(&worker_root, &receiver))?;

        Ok(DumpService {
            root,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Directory the classes are written to
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting classes and wait until every queued class is written.
    ///
    /// Later calls, and classes written after shutdown, are no-ops.
    pub fn shutdown(&self) {
        drop(lock!(self.sender).take());

        if let Some(worker) = lock!(self.worker).take() {
            if worker.join().is_err() {
                debug!("Dump worker panicked");
            }
        }
    }
}

impl DumpSink for DumpService {
    fn write(&self, qualified_name: &str, bytes: Vec<u8>) {
        if let Some(sender) = lock!(self.sender).as_ref() {
            let job = DumpJob {
                name: qualified_name.to_string(),
                bytes,
            };
            if sender.send(job).is_err() {
                debug!(class = qualified_name, "Dump worker gone, class not dumped");
            }
        }
    }
}

impl Drop for DumpService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain(root: &Path, receiver: &Receiver<DumpJob>) {
    for job in receiver {
        let path = class_file_path(root, &job.name);
        match write_creating_parents(&path, &job.bytes) {
            Ok(()) => trace!(path = %path.display(), "Dumped class"),
            Err(error) => debug!(path = %path.display(), %error, "Failed to dump class"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_package_directories() {
        let dir = tempfile::tempdir().unwrap();
        let service = DumpService::start(dir.path().join("dump")).unwrap();

        service.write("com.example.Foo", vec![0xCA, 0xFE]);
        service.write("Bare", vec![1]);
        service.shutdown();

        assert_eq!(
            fs::read(dir.path().join("dump/com/example/Foo.class")).unwrap(),
            vec![0xCA, 0xFE]
        );
        assert_eq!(fs::read(dir.path().join("dump/Bare.class")).unwrap(), vec![1]);
    }

    #[test]
    fn shutdown_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let service = DumpService::start(dir.path()).unwrap();
        for i in 0..200 {
            service.write(&format!("p.C{i}"), vec![i as u8]);
        }
        drop(service);

        let written = fs::read_dir(dir.path().join("p")).unwrap().count();
        assert_eq!(written, 200);
    }

    #[test]
    fn write_after_shutdown_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let service = DumpService::start(dir.path()).unwrap();
        service.shutdown();
        service.write("a.B", vec![1]);
        service.shutdown();
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn io_errors_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the package directory should go
        fs::write(dir.path().join("a"), b"").unwrap();
        let service = DumpService::start(dir.path()).unwrap();
        service.write("a.B", vec![1]);
        service.write("c.D", vec![2]);
        service.shutdown();
        assert!(dir.path().join("c/D.class").exists());
    }
}
