//! Named-format registry layered atop byte bulk data.
//!
//! One logical asset often carries several platform- or codec-specific
//! renditions of its payload (e.g. per-target texture encodings). The
//! container maps format names to byte bulk data instances, created on
//! first access. Names are unique and iterate in sorted order so saves are
//! deterministic.

use std::collections::BTreeMap;

use crate::archive::Archive;
use crate::bulk::{BulkData, SerializeContext};
use crate::error::Result;
use crate::flags::BulkDataFlags;

/// Format name → owned byte bulk data.
#[derive(Default)]
pub struct FormatContainer {
    formats: BTreeMap<String, BulkData>,
}

impl FormatContainer {
    pub fn new() -> FormatContainer {
        FormatContainer::default()
    }

    /// Find-or-insert access to the bulk data stored under `name`.
    pub fn format(&mut self, name: &str) -> &mut BulkData {
        self.formats.entry(name.to_owned()).or_insert_with(BulkData::byte)
    }

    /// Whether `name` is present, without inserting it.
    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Iterates format names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// Serializes the container.
    ///
    /// Saving happens during cooking only and requires `formats_to_save`,
    /// the set of names that survive the current cook: the count of
    /// non-empty allow-listed formats goes out first, then each (name,
    /// bulk data) pair with flags temporarily forced to inline placement
    /// (plus `SINGLE_USE` when `single_use` is set) and restored after the
    /// write. Loading reads count then pairs via find-or-insert.
    pub fn serialize(
        &mut self,
        ar: &mut dyn Archive,
        ctx: &mut SerializeContext<'_>,
        formats_to_save: Option<&[String]>,
        single_use: bool,
        alignment: usize,
    ) -> Result<()> {
        if ar.is_loading() {
            let mut count = 0i32;
            ar.serialize_i32(&mut count)?;
            for _ in 0..count {
                let mut name = String::new();
                ar.serialize_string(&mut name)?;
                let bulk = self.format(&name);
                bulk.set_alignment(alignment);
                bulk.serialize(ar, ctx)?;
            }
            Ok(())
        } else {
            let formats_to_save = formats_to_save
                .expect("format containers are saved with an explicit format list");
            assert!(ar.is_cooking(), "format containers are saved during cooking only");

            let mut count = self
                .formats
                .iter()
                .filter(|(name, bulk)| formats_to_save.contains(*name) && bulk.size() > 0)
                .count() as i32;
            ar.serialize_i32(&mut count)?;

            for (name, bulk) in &mut self.formats {
                if !formats_to_save.contains(name) || bulk.size() == 0 {
                    continue;
                }
                let mut name = name.clone();
                ar.serialize_string(&mut name)?;

                // Streamed consumers need these payloads next to the header.
                let forced = if single_use {
                    BulkDataFlags::FORCE_INLINE_PAYLOAD | BulkDataFlags::SINGLE_USE
                } else {
                    BulkDataFlags::FORCE_INLINE_PAYLOAD
                };
                let original = bulk.flags();
                bulk.set_flags(forced);
                let result = bulk.serialize(ar, ctx);
                bulk.clear_flags(BulkDataFlags::all());
                bulk.set_flags(original);
                result?;
            }
            Ok(())
        }
    }
}
