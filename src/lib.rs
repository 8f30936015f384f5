// bulkdata — lazily-loaded bulk payload engine for asset serialization

pub mod archive;
pub mod buffer;
pub mod bulk;
pub mod config;
pub mod element;
pub mod error;
pub mod flags;
pub mod formats;
pub mod linker;
pub mod tracking;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level convenience re-exports for the most common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// The bulk data instance itself.
pub use bulk::BulkData;
/// Per-call collaborator bundle for `BulkData::serialize`.
pub use bulk::SerializeContext;
/// Hook supplying externally-owned payload memory.
pub use bulk::ResourceMemoryProvider;

/// The archive collaborator contract.
pub use archive::Archive;
/// In-memory archive with shareable backing store.
pub use archive::MemoryArchive;
/// Read-only file-backed archive.
pub use archive::FileReaderArchive;
/// Non-owning attachment handle from an instance back to its archive.
pub use archive::ArchiveBacking;

/// Aligned payload allocation with explicit ownership.
pub use buffer::PayloadBuffer;
/// Default payload allocation alignment.
pub use buffer::DEFAULT_ALIGNMENT;

/// Persisted per-instance flag word.
pub use flags::BulkDataFlags;
/// On-disk codec selector derived from the flag word.
pub use flags::CompressionFlags;
/// Lock request flags for `BulkData::lock`.
pub use flags::LockFlags;
/// Runtime lock state.
pub use flags::LockStatus;

/// Fixed-width element descriptor.
pub use element::ElementType;

/// Error type shared by the archive layer and the engine.
pub use error::ArchiveError;
/// Crate-wide result alias.
pub use error::Result;

/// Save-side linker accumulating end-of-file payload appends.
pub use linker::LinkerSave;
/// Load-side linker: offset base and filename.
pub use linker::LinkerLoad;

/// Named-format registry layered atop byte bulk data.
pub use formats::FormatContainer;

/// Owner identity recorded in the usage-tracking table.
pub use tracking::OwnerTag;
/// Render per-class and per-object resident-payload summaries.
pub use tracking::dump_usage;
