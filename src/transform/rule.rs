//! Traits implemented by transform rules and by the host's collaborators.
//!
//! The pipeline only talks to the outside world through these traits:
//!
//! - [`TransformRule`] - Pluggable rewriting logic, registered in a [`crate::transform::Registry`]
//! - [`MandatoryTransform`] - The host's own transform, run between the early and late rules
//! - [`ClassCache`] - Persistent mapping from original to transformed class bytes
//! - [`EscapeSink`] - Receives classes carrying the relocation marker
//! - [`DumpSink`] - Best-effort debug output of transformed classes
//! - [`Initializer`] - Entry point of a module that contributes rules
//!
//! All of them are shared between loader threads and must therefore be [`Send`] and [`Sync`].

use crate::{
    classfile::{ClassUnit, EncodeFlags},
    transform::{Identifier, Registry},
    Result,
};

/// Post-processing requested by the rules of one phase.
///
/// A single rule asking for frames is enough to have the whole class re-encoded with frame
/// computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformFlags {
    maxs: bool,
    frames: bool,
}

impl TransformFlags {
    /// Have `max_stack` and `max_locals` recomputed
    pub fn request_maxs(&mut self) {
        self.maxs = true;
    }

    /// Have stack map frames recomputed (implies maxs)
    pub fn request_frames(&mut self) {
        self.frames = true;
    }

    /// Returns `true` if maxs were requested
    #[must_use]
    pub fn maxs_requested(&self) -> bool {
        self.maxs
    }

    /// Returns `true` if frames were requested
    #[must_use]
    pub fn frames_requested(&self) -> bool {
        self.frames
    }

    /// The class writer flags matching the requests
    #[must_use]
    pub fn encode_flags(&self) -> EncodeFlags {
        let mut flags = EncodeFlags::empty();
        flags.set(EncodeFlags::COMPUTE_MAXS, self.maxs);
        flags.set(EncodeFlags::COMPUTE_FRAMES, self.frames);
        flags
    }
}

/// A unit of rewriting logic.
///
/// Rules are consulted through [`TransformRule::handles_class`] before the class is decoded;
/// a phase in which no rule applies never decodes the class at all.
pub trait TransformRule: Send + Sync {
    /// Stable name, used in logs and errors
    fn name(&self) -> &Identifier;

    /// Cheap check whether this rule might change the class.
    ///
    /// `name` is the name the class was requested under, `loader_name` the name visible to
    /// the class loader (they differ under remapping).
    fn handles_class(&self, name: &str, loader_name: &str) -> bool;

    /// Rewrite `class` in place.
    ///
    /// Returns `true` if anything changed. Rules that alter control flow or stack usage must
    /// request recomputation through `flags`.
    ///
    /// # Errors
    /// Any error aborts the transformation of this class; it is reported as
    /// [`crate::Error::RuleFailed`].
    fn transform(&self, class: &mut ClassUnit, flags: &mut TransformFlags) -> Result<bool>;
}

/// The host's transform that every class outside the denylist passes through exactly once,
/// after the early rules and before the late rules.
pub trait MandatoryTransform: Send + Sync {
    /// Transform the class bytes.
    ///
    /// # Errors
    /// Errors are propagated to the caller of the pipeline unchanged.
    fn transform(&self, name: &str, loader_name: &str, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

impl<F> MandatoryTransform for F
where
    F: Fn(&str, &str, Vec<u8>) -> Result<Vec<u8>> + Send + Sync,
{
    fn transform(&self, name: &str, loader_name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        self(name, loader_name, bytes)
    }
}

/// A [`MandatoryTransform`] that returns its input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl MandatoryTransform for Passthrough {
    fn transform(&self, _name: &str, _loader_name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// Persistent cache of transformation results, keyed by the original class bytes.
pub trait ClassCache: Send + Sync {
    /// Name used to select the cache in the configuration
    fn name(&self) -> &Identifier;

    /// Load persisted entries; called once before the first transformation.
    ///
    /// # Errors
    /// A failure disables the cache for the rest of the process.
    fn load(&self) -> Result<()>;

    /// Persist entries added since the last save.
    ///
    /// # Errors
    /// Returns an error if the entries could not be written.
    fn save(&self) -> Result<()>;

    /// Transformed bytes stored for `original`.
    ///
    /// # Errors
    /// The pipeline treats any error as a miss.
    fn get(&self, original: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `transformed` for `original`.
    ///
    /// # Errors
    /// The pipeline logs errors and carries on.
    fn put(&self, original: &[u8], transformed: &[u8]) -> Result<()>;
}

/// Receives the bytes of classes that carry the relocation marker.
pub trait EscapeSink: Send + Sync {
    /// Define the class outside the requesting loader.
    ///
    /// # Errors
    /// A failure is fatal: the pipeline logs it and terminates the process.
    fn inject(&self, bytes: &[u8]) -> Result<()>;
}

/// Best-effort debug output of class bytes.
pub trait DumpSink: Send + Sync {
    /// Queue `bytes` for output under `qualified_name`; never blocks on I/O and never fails
    fn write(&self, qualified_name: &str, bytes: Vec<u8>);
}

/// Entry point of a module that contributes rules or caches.
///
/// Called exactly once, while the registry is open.
pub trait Initializer {
    /// Register rules and caches with `registry`.
    ///
    /// # Errors
    /// A failing initializer is logged and skipped; whatever it registered before failing
    /// stays registered.
    fn on_initialize(&self, registry: &Registry) -> Result<()>;
}

impl<F> Initializer for F
where
    F: Fn(&Registry) -> Result<()>,
{
    fn on_initialize(&self, registry: &Registry) -> Result<()> {
        self(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_encode_flags() {
        let mut flags = TransformFlags::default();
        assert_eq!(flags.encode_flags(), EncodeFlags::empty());

        flags.request_maxs();
        assert_eq!(flags.encode_flags(), EncodeFlags::COMPUTE_MAXS);

        flags.request_frames();
        assert!(flags.maxs_requested() && flags.frames_requested());
        assert_eq!(
            flags.encode_flags(),
            EncodeFlags::COMPUTE_MAXS | EncodeFlags::COMPUTE_FRAMES
        );
    }

    #[test]
    fn closures_are_mandatory_transforms() {
        let upper = |_: &str, _: &str, bytes: Vec<u8>| -> Result<Vec<u8>> {
            Ok(bytes.to_ascii_uppercase())
        };
        assert_eq!(upper.transform("a.B", "a.B", b"ab".to_vec()).unwrap(), b"AB");
        assert_eq!(Passthrough.transform("a.B", "a.B", vec![1]).unwrap(), vec![1]);
    }
}
