//! Diagnostic tracking of live bulk data instances.
//!
//! A process-wide, mutex-guarded table maps instance ids to their owning
//! object tag and resident byte count. Tracking is off by default and
//! enabled explicitly; when disabled, registration is a no-op and the table
//! stays empty. [`dump_usage`] renders per-class and per-object summaries,
//! largest first, to any writer.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Identity of the object that owns a bulk data instance, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerTag {
    /// Full object name, e.g. `Texture2D /Game/Bricks.Bricks`.
    pub name: String,
    /// Class name, e.g. `Texture2D`; per-class totals aggregate on this.
    pub class: String,
}

impl OwnerTag {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> OwnerTag {
        OwnerTag { name: name.into(), class: class.into() }
    }
}

struct Entry {
    owner: OwnerTag,
    bytes: usize,
    loaded: bool,
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static TABLE: Lazy<Mutex<HashMap<u64, Entry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Enables or disables tracking. Returns the new value. Disabling clears
/// the table.
pub fn set_enabled(enable: bool) -> bool {
    ENABLED.store(enable, Ordering::Relaxed);
    if !enable {
        TABLE.lock().unwrap().clear();
    }
    enable
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Number of tracked instances.
pub fn tracked_count() -> usize {
    TABLE.lock().unwrap().len()
}

pub(crate) fn register(id: u64, owner: OwnerTag, bytes: usize, loaded: bool) {
    if !is_enabled() {
        return;
    }
    TABLE.lock().unwrap().insert(id, Entry { owner, bytes, loaded });
}

pub(crate) fn update(id: u64, bytes: usize, loaded: bool) {
    if !is_enabled() {
        return;
    }
    if let Some(entry) = TABLE.lock().unwrap().get_mut(&id) {
        entry.bytes = bytes;
        entry.loaded = loaded;
    }
}

pub(crate) fn unregister(id: u64) {
    TABLE.lock().unwrap().remove(&id);
}

/// Writes per-class and per-object summaries of resident bulk data to
/// `sink`, sorted by size descending.
pub fn dump_usage(sink: &mut dyn Write) -> io::Result<()> {
    if !is_enabled() {
        writeln!(sink, "Bulk data usage tracking is disabled; enable it before dumping.")?;
        return Ok(());
    }

    let mut per_object: Vec<(String, usize)> = Vec::new();
    let mut per_class: HashMap<String, usize> = HashMap::new();
    {
        let table = TABLE.lock().unwrap();
        for entry in table.values() {
            if !entry.loaded || entry.bytes == 0 {
                continue;
            }
            per_object.push((entry.owner.name.clone(), entry.bytes));
            *per_class.entry(entry.owner.class.clone()).or_insert(0) += entry.bytes;
        }
    }

    let mut per_class: Vec<(String, usize)> = per_class.into_iter().collect();
    per_class.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    per_object.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    writeln!(sink)?;
    writeln!(sink, "Per class summary of bulk data use:")?;
    for (class, bytes) in &per_class {
        writeln!(sink, "  {:>5} KByte of bulk data for class {}", bytes / 1024, class)?;
    }
    writeln!(sink)?;
    writeln!(sink, "Detailed per object stats of bulk data use:")?;
    for (name, bytes) in &per_object {
        writeln!(sink, "  {:>5} KByte of bulk data for {}", bytes / 1024, name)?;
    }
    writeln!(sink)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The table and the enable switch are process-wide, so one test body
    // drives the whole lifecycle.
    #[test]
    fn tracking_lifecycle_and_report() {
        set_enabled(false);
        register(1, OwnerTag::new("A", "ClassA"), 1024, true);
        assert_eq!(tracked_count(), 0);

        set_enabled(true);
        register(10, OwnerTag::new("Texture /Game/A.A", "Texture2D"), 4096, true);
        register(11, OwnerTag::new("Texture /Game/B.B", "Texture2D"), 8192, true);
        register(12, OwnerTag::new("Sound /Game/C.C", "SoundWave"), 2048, true);
        register(13, OwnerTag::new("Sound /Game/D.D", "SoundWave"), 1024, false);

        let mut out = Vec::new();
        dump_usage(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        // Texture2D total (12 KiB) sorts ahead of SoundWave (2 KiB); the
        // unloaded instance is excluded.
        let class_a = text.find("class Texture2D").unwrap();
        let class_b = text.find("class SoundWave").unwrap();
        assert!(class_a < class_b, "{}", text);
        assert!(!text.contains("/Game/D.D"), "{}", text);

        let obj_b = text.find("/Game/B.B").unwrap();
        let obj_a = text.find("/Game/A.A").unwrap();
        assert!(obj_b < obj_a, "{}", text);

        for id in [10, 11, 12, 13] {
            unregister(id);
        }
        assert_eq!(tracked_count(), 0);
        set_enabled(false);
    }
}
