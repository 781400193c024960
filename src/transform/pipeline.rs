//! Per-class transformation pipeline.
//!
//! [`Pipeline::transform`] is the single entry point the host calls for every class load
//! event. For one class name the pipeline moves through `unseen -> in-flight -> settled`
//! exactly once per process:
//!
//! 1. Dedup check, then a double-checked claim in the [`DedupGuard`]; a name that is already
//!    claimed is passed through unchanged.
//! 2. Denylisted names (the built-in [`BUILTIN_DENYLIST`] plus configured prefixes) only go
//!    through the [`MandatoryTransform`]. They are neither cached nor seen by any rule.
//! 3. A cache hit replaces all further work.
//! 4. The relocation marker is detected on the original bytes, before a rule can remove it.
//! 5. Early rules, the mandatory transform and late rules run in that order. Each rule phase
//!    decodes the class only when at least one of its rules
//!    [`handles_class`](crate::transform::TransformRule::handles_class), and returns its input
//!    unchanged when no rule changed anything.
//! 6. The result is written to the cache under the original bytes, dumped if requested, and
//!    either returned or handed to the [`EscapeSink`].
//!
//! # Failure Handling
//!
//! Rule errors abort the class as [`Error::RuleFailed`]; errors of the mandatory transform
//! are returned as they are. Cache failures are logged and treated as misses. A failing
//! [`EscapeSink`] terminates the process, because the class has then neither been defined
//! elsewhere nor returned to its loader.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::{
    classfile::{
        ClassReader, ClassUnit, ClassWriter, DefaultHierarchy, ReaderFlags, TypeCache,
        TypeHierarchy,
    },
    config::DumpMode,
    transform::{
        builtin::{RelocationRule, BUILTIN_DENYLIST, RELOCATION_MARKER},
        ClassCache, DumpSink, EscapeSink, MandatoryTransform, Registry, TransformFlags,
        TransformRule,
    },
    utils::DedupGuard,
    Error, Result,
};

/// Result of [`Pipeline::transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Bytes the requesting loader should define
    Bytes(Vec<u8>),
    /// The class was handed to the [`EscapeSink`]; the loader must not define it
    Redirected,
}

impl LoadOutcome {
    /// The bytes, or `None` if the class was redirected
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            LoadOutcome::Bytes(bytes) => Some(bytes),
            LoadOutcome::Redirected => None,
        }
    }
}

struct NoEscape;

impl EscapeSink for NoEscape {
    fn inject(&self, _bytes: &[u8]) -> Result<()> {
        Err(Error::Transform("No escape sink is installed".to_string()))
    }
}

/// Assembles a [`Pipeline`] from a frozen [`Registry`] and the host's collaborators.
pub struct PipelineBuilder {
    early: Vec<Arc<dyn TransformRule>>,
    late: Vec<Arc<dyn TransformRule>>,
    mandatory: Arc<dyn MandatoryTransform>,
    cache: Option<Arc<dyn ClassCache>>,
    escape: Arc<dyn EscapeSink>,
    dump: Option<Arc<dyn DumpSink>>,
    dump_mode: DumpMode,
    denylist: Vec<String>,
    hierarchy: Arc<dyn TypeHierarchy>,
}

impl PipelineBuilder {
    /// Use `cache` for lookups and write-through
    #[must_use]
    pub fn cache(mut self, cache: Option<Arc<dyn ClassCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Where relocated classes go
    #[must_use]
    pub fn escape_sink(mut self, escape: Arc<dyn EscapeSink>) -> Self {
        self.escape = escape;
        self
    }

    /// Dump classes to `sink` according to `mode`
    #[must_use]
    pub fn dump(mut self, sink: Arc<dyn DumpSink>, mode: DumpMode) -> Self {
        self.dump = Some(sink);
        self.dump_mode = mode;
        self
    }

    /// Add denied class name prefixes
    #[must_use]
    pub fn deny<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist.extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Type hierarchy used when rules request frame computation
    #[must_use]
    pub fn hierarchy(mut self, hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    /// Finish the pipeline
    #[must_use]
    pub fn build(self) -> Pipeline {
        let dump_mode = if self.dump.is_some() {
            self.dump_mode
        } else {
            DumpMode::Off
        };

        Pipeline {
            seen: DedupGuard::new(),
            early: self.early,
            late: self.late,
            relocation: RelocationRule::default(),
            mandatory: self.mandatory,
            cache: self.cache,
            escape: self.escape,
            dump: self.dump,
            dump_mode,
            denylist: self.denylist,
            writer: ClassWriter::with_hierarchy(self.hierarchy, Arc::new(TypeCache::new())),
        }
    }
}

/// Deduplicated, cached two-phase rule pipeline.
///
/// One pipeline serves all loader threads; [`Pipeline::transform`] takes `&self`.
pub struct Pipeline {
    seen: DedupGuard,
    early: Vec<Arc<dyn TransformRule>>,
    late: Vec<Arc<dyn TransformRule>>,
    relocation: RelocationRule,
    mandatory: Arc<dyn MandatoryTransform>,
    cache: Option<Arc<dyn ClassCache>>,
    escape: Arc<dyn EscapeSink>,
    dump: Option<Arc<dyn DumpSink>>,
    dump_mode: DumpMode,
    denylist: Vec<String>,
    writer: ClassWriter,
}

impl Pipeline {
    /// Start a pipeline over the rules of `registry`.
    ///
    /// # Panics
    /// Panics unless `registry` is frozen.
    pub fn builder(
        registry: &Registry,
        mandatory: Arc<dyn MandatoryTransform>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            early: registry.early_rules(),
            late: registry.late_rules(),
            mandatory,
            cache: None,
            escape: Arc::new(NoEscape),
            dump: None,
            dump_mode: DumpMode::Off,
            denylist: Vec::new(),
            hierarchy: Arc::new(DefaultHierarchy),
        }
    }

    /// Returns `true` if `name` skips all rule phases
    #[must_use]
    pub fn is_denied(&self, name: &str) -> bool {
        BUILTIN_DENYLIST
            .iter()
            .copied()
            .chain(self.denylist.iter().map(String::as_str))
            .any(|prefix| name.starts_with(prefix))
    }

    /// Returns `true` if `name` has already entered the pipeline
    #[must_use]
    pub fn has_seen(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// The active cache
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn ClassCache>> {
        self.cache.as_ref()
    }

    /// Transform one class.
    ///
    /// `name` is the name the class is requested under, `loader_name` the name visible to the
    /// loader; rules receive both. The first call for a `name` does the work, every later call
    /// returns `bytes` unchanged.
    ///
    /// # Errors
    /// Returns [`Error::RuleFailed`] if a rule failed, the mandatory transform's error if it
    /// failed, and decoding or encoding errors of the class file.
    pub fn transform(
        &self,
        name: &str,
        loader_name: &str,
        bytes: Vec<u8>,
    ) -> Result<LoadOutcome> {
        if self.seen.contains(name) || !self.seen.claim(name) {
            trace!(class = name, "Already seen, passing through");
            return Ok(LoadOutcome::Bytes(bytes));
        }

        if bytes.is_empty() {
            return Ok(LoadOutcome::Bytes(bytes));
        }

        if self.is_denied(name) {
            debug!(class = name, "Denylisted, running mandatory transform only");
            if self.dump_mode == DumpMode::Force {
                self.dump(name, &bytes);
            }
            let bytes = self.mandatory.transform(name, loader_name, bytes)?;
            let relocate = has_relocation_marker(&bytes)?;
            return Ok(self.finish(name, bytes, relocate));
        }

        if let Some(cache) = &self.cache {
            match cache.get(&bytes) {
                Ok(Some(cached)) => {
                    debug!(class = name, "Cache hit");
                    return Ok(LoadOutcome::Bytes(cached));
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        class = name,
                        cache = %cache.name(),
                        %error,
                        "Cache lookup failed, treating as miss"
                    );
                }
            }
        }

        let original = self.cache.as_ref().map(|_| bytes.clone());
        let relocate = has_relocation_marker(&bytes)?;
        let mut modified = false;

        let early: Vec<&dyn TransformRule> = self.early.iter().map(|rule| &**rule).collect();
        let bytes = self.run_phase(name, loader_name, bytes, &early, &mut modified)?;

        let bytes = self.mandatory.transform(name, loader_name, bytes)?;

        let mut late: Vec<&dyn TransformRule> = self.late.iter().map(|rule| &**rule).collect();
        if relocate {
            late.push(&self.relocation);
        }
        let bytes = self.run_phase(name, loader_name, bytes, &late, &mut modified)?;

        if let (Some(cache), Some(original)) = (&self.cache, original) {
            if !relocate {
                if let Err(error) = cache.put(&original, &bytes) {
                    warn!(class = name, cache = %cache.name(), %error, "Cache write failed");
                }
            }
        }

        if self.dump_mode == DumpMode::Force || (self.dump_mode == DumpMode::On && modified) {
            self.dump(name, &bytes);
        }

        Ok(self.finish(name, bytes, relocate))
    }

    /// Run the applicable `rules` over `bytes`, re-encoding only if one of them changed the
    /// class.
    fn run_phase(
        &self,
        name: &str,
        loader_name: &str,
        bytes: Vec<u8>,
        rules: &[&dyn TransformRule],
        modified: &mut bool,
    ) -> Result<Vec<u8>> {
        let applicable: Vec<&dyn TransformRule> = rules
            .iter()
            .copied()
            .filter(|rule| rule.handles_class(name, loader_name))
            .collect();
        if applicable.is_empty() {
            return Ok(bytes);
        }

        let mut class = ClassUnit::parse(&bytes, ReaderFlags::empty())?;
        let mut flags = TransformFlags::default();
        let mut changed = false;
        for rule in applicable {
            let result = rule
                .transform(&mut class, &mut flags)
                .map_err(|source| Error::RuleFailed {
                    rule: rule.name().clone(),
                    source: Box::new(source),
                })?;
            if result {
                debug!(class = name, rule = %rule.name(), "Rule changed class");
            }
            changed |= result;
        }

        if !changed {
            return Ok(bytes);
        }

        *modified = true;
        self.writer.encode(&class, flags.encode_flags())
    }

    fn dump(&self, name: &str, bytes: &[u8]) {
        if let Some(sink) = &self.dump {
            sink.write(name, bytes.to_vec());
        }
    }

    fn finish(&self, name: &str, bytes: Vec<u8>, relocate: bool) -> LoadOutcome {
        if !relocate {
            return LoadOutcome::Bytes(bytes);
        }

        debug!(class = name, "Relocating class");
        if let Err(error) = self.escape.inject(&bytes) {
            error!(class = name, %error, "Failed to relocate class, terminating");
            std::process::exit(1);
        }
        LoadOutcome::Redirected
    }
}

/// Returns `true` if the class declares the relocation marker as a class annotation.
fn has_relocation_marker(bytes: &[u8]) -> Result<bool> {
    Ok(ClassReader::new(bytes)?
        .class_annotation_types()?
        .iter()
        .any(|desc| desc == RELOCATION_MARKER))
}
