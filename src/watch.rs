//! Periodic background rescans of a manifest folder.
//!
//! The watcher thread owns a snapshot of the known paths and never touches the manifest. Every
//! non-empty [`RescanDelta`] is sent over a channel; the owner applies it with
//! [`Manifest::apply_rescan`](crate::manifest::Manifest::apply_rescan) between user actions.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::DiscoveryError;
use crate::manifest::{self, KnownPaths, RescanDelta};

/// Message sent by a [`FolderWatcher`].
#[derive(Debug)]
pub enum WatchEvent {
    /// The folder changed.
    Changed(RescanDelta),
    /// A rescan failed; the watcher keeps polling.
    Failed(DiscoveryError),
}

enum Control {
    Stop,
    Resync(KnownPaths),
}

/// Background thread polling a folder for added, vanished and restored files.
pub struct FolderWatcher {
    control: Sender<Control>,
    events: Receiver<WatchEvent>,
    handle: Option<JoinHandle<()>>,
}

impl FolderWatcher {
    /// Starts polling `folder` every `interval`, starting from the `known` snapshot.
    pub fn spawn(folder: PathBuf, recursive: bool, known: KnownPaths, interval: Duration) -> Self {
        let (control_tx, control_rx) = bounded::<Control>(4);
        let (event_tx, event_rx) = unbounded::<WatchEvent>();

        let handle = thread::spawn(move || {
            let mut known = known;
            log::debug!("watching {} every {:?}", folder.display(), interval);
            loop {
                match control_rx.recv_timeout(interval) {
                    Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Ok(Control::Resync(snapshot)) => {
                        known = snapshot;
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let event = match manifest::scan_delta(&folder, recursive, &known) {
                    Ok(delta) if delta.is_empty() => continue,
                    Ok(delta) => {
                        remember(&mut known, &delta);
                        WatchEvent::Changed(delta)
                    }
                    Err(err) => {
                        log::warn!("rescan of {} failed: {err}", folder.display());
                        WatchEvent::Failed(err)
                    }
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            log::debug!("stopped watching {}", folder.display());
        });

        Self {
            control: control_tx,
            events: event_rx,
            handle: Some(handle),
        }
    }

    /// Receiver of watch events.
    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events
    }

    /// Returns every pending event without blocking.
    pub fn drain(&self) -> Vec<WatchEvent> {
        self.events.try_iter().collect()
    }

    /// Replaces the watcher's snapshot, e.g. after stale items were removed.
    pub fn resync(&self, known: KnownPaths) {
        let _ = self.control.send(Control::Resync(known));
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("folder watcher thread panicked");
            }
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn remember(known: &mut KnownPaths, delta: &RescanDelta) {
    for item in &delta.added {
        known.insert(item.source_path().to_path_buf(), false);
    }
    for path in &delta.restored {
        known.insert(path.clone(), false);
    }
    for path in &delta.vanished {
        known.insert(path.clone(), true);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::{FolderWatcher, WatchEvent};
    use crate::config::PackagerConfig;
    use crate::manifest::Manifest;

    #[test]
    fn reports_new_and_vanished_files_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t_1.pdf"), b"not really a pdf").unwrap();
        let config = PackagerConfig::default();
        let mut manifest = Manifest::load_folder(dir.path(), &config).unwrap();
        assert_eq!(manifest.len(), 1);

        let folder = manifest.folder().unwrap().to_path_buf();
        let watcher = FolderWatcher::spawn(
            folder.clone(),
            false,
            manifest.known_paths(),
            Duration::from_millis(20),
        );

        fs::write(folder.join("t_2.rtf"), b"{\\rtf1 Table 2}").unwrap();
        fs::remove_file(folder.join("t_1.pdf")).unwrap();

        let mut applied = 0;
        while manifest.items().iter().filter(|item| item.is_stale()).count() == 0
            || manifest.len() < 2
        {
            match watcher.events().recv_timeout(Duration::from_secs(5)).unwrap() {
                WatchEvent::Changed(delta) => manifest.apply_rescan(delta),
                WatchEvent::Failed(err) => panic!("rescan failed: {err}"),
            }
            applied += 1;
            assert!(applied <= 2);
        }

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.selected().len(), 1);
        std::thread::sleep(Duration::from_millis(100));
        assert!(watcher.drain().is_empty());
        watcher.stop();
    }
}
