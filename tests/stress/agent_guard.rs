//! Stress test: concurrent agent mutations through the process-wide guard.
//!
//! A recording adapter checks that no two mutations ever run at the same
//! time and that `replace_keys` is never split by another thread's call.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gitusr::{AgentAdapter, GuardedAgent, Result};

#[derive(Default)]
struct RecordingAgent {
    inside: AtomicUsize,
    max_inside: AtomicUsize,
    events: Mutex<Vec<(usize, String)>>,
}

thread_local! {
    static WORKER: std::cell::Cell<usize> = const { std::cell::Cell::new(usize::MAX) };
}

impl RecordingAgent {
    fn record(&self, event: String) -> Result<()> {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_micros(200));
        let worker = WORKER.with(|w| w.get());
        self.events.lock().unwrap().push((worker, event));
        self.inside.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AgentAdapter for RecordingAgent {
    fn is_running(&self) -> bool {
        true
    }
    fn load_key(&self, path: &Path) -> Result<()> {
        self.record(format!("load {}", path.display()))
    }
    fn unload_key(&self, path: &Path) -> Result<()> {
        self.record(format!("unload {}", path.display()))
    }
    fn unload_all(&self) -> Result<()> {
        self.record("unload-all".to_string())
    }
    fn list_loaded_key_labels(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    fn is_key_loaded(&self, _path: &Path) -> bool {
        false
    }
}

#[test]
fn stress_16_threads_never_overlap() {
    let agent = Arc::new(RecordingAgent::default());

    let handles: Vec<_> = (0..16)
        .map(|worker| {
            let agent = Arc::clone(&agent);
            thread::spawn(move || {
                WORKER.with(|w| w.set(worker));
                let guarded = GuardedAgent::new(&*agent);
                let key = format!("/keys/{worker}");
                for round in 0..20 {
                    let result = match round % 4 {
                        0 => guarded.load_key(Path::new(&key)),
                        1 => guarded.unload_key(Path::new(&key)),
                        2 => guarded.unload_all(),
                        _ => guarded.replace_keys(Path::new(&key)),
                    };
                    result.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(agent.max_inside.load(Ordering::SeqCst), 1);

    // 16 workers x 20 rounds, replace_keys records two events.
    let events = agent.events.lock().unwrap();
    assert_eq!(events.len(), 16 * 25);

    // Every unload-all issued by replace_keys is immediately followed by the
    // same worker's load.
    for pair in events.windows(2) {
        let ((first_worker, first), (second_worker, second)) = (&pair[0], &pair[1]);
        if first == "unload-all" && second.starts_with("load ") && first_worker == second_worker {
            assert_eq!(second, &format!("load /keys/{first_worker}"));
        }
    }
    let replace_pairs = events
        .windows(2)
        .filter(|pair| {
            pair[0].1 == "unload-all"
                && pair[1].1.starts_with("load ")
                && pair[0].0 == pair[1].0
        })
        .count();
    assert!(replace_pairs >= 16 * 5);
}

#[test]
fn stress_panicking_worker_does_not_block_others() {
    struct PanickingAgent;

    impl AgentAdapter for PanickingAgent {
        fn is_running(&self) -> bool {
            true
        }
        fn load_key(&self, _path: &Path) -> Result<()> {
            panic!("agent crashed");
        }
        fn unload_key(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        fn unload_all(&self) -> Result<()> {
            Ok(())
        }
        fn list_loaded_key_labels(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn is_key_loaded(&self, _path: &Path) -> bool {
            false
        }
    }

    let crashed = thread::spawn(|| {
        GuardedAgent::new(PanickingAgent).load_key(Path::new("/k")).ok();
    })
    .join();
    assert!(crashed.is_err());

    let survivor = thread::spawn(|| GuardedAgent::new(PanickingAgent).unload_all())
        .join()
        .unwrap();
    assert!(survivor.is_ok());
}
