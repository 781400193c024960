//! Start-up sequence: configuration, rule discovery, cache and dump set-up.
//!
//! [`Launcher`] performs the one-time initialization that has to happen before the first
//! class is transformed:
//!
//! 1. Open the [`Registry`] and call every [`Initializer`]. A failing initializer is logged and
//!    skipped.
//! 2. Freeze the registry and select the active [`crate::transform::ClassCache`]. If loading the cache fails,
//!    the process runs without one.
//! 3. When dumping is enabled, clear the dump directory and start the [`DumpService`].
//! 4. Build the [`Pipeline`].
//!
//! The resulting [`Instrumentation`] owns everything that must be flushed on exit; call
//! [`Instrumentation::shutdown`] from the host's shutdown hook.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use classweave::{prelude::*, transform::RelocationRule};
//!
//! let instrumentation = Launcher::from_config_file(Path::new("config/classweave.toml"))?
//!     .with_disk_cache()
//!     .initializer(|registry: &Registry| -> Result<()> {
//!         registry.register_late(Arc::new(RelocationRule::default()));
//!         Ok(())
//!     })
//!     .launch(Arc::new(Passthrough))?;
//!
//! let bytes = std::fs::read("Example.class")?;
//! let outcome = instrumentation.pipeline().transform("com.example.Example", "com.example.Example", bytes)?;
//! instrumentation.shutdown()?;
//! # Ok::<(), classweave::Error>(())
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, error, info, warn};

use crate::{
    classfile::TypeHierarchy,
    config::{Configuration, DumpMode},
    transform::{
        cache::DiskCache, dump::DumpService, EscapeSink, Initializer, MandatoryTransform,
        Pipeline, Registry,
    },
    utils::fs::delete_tree,
    Result,
};

/// Builder for the start-up sequence.
pub struct Launcher {
    config: Configuration,
    config_path: Option<PathBuf>,
    initializers: Vec<Box<dyn Initializer>>,
    disk_cache: bool,
    escape: Option<Arc<dyn EscapeSink>>,
    hierarchy: Option<Arc<dyn TypeHierarchy>>,
}

impl Launcher {
    /// Launch with an in-memory configuration that is never saved
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Launcher {
            config,
            config_path: None,
            initializers: Vec::new(),
            disk_cache: false,
            escape: None,
            hierarchy: None,
        }
    }

    /// Launch with the configuration stored at `path`; see [`Configuration::load`].
    ///
    /// # Errors
    /// Returns the errors of [`Configuration::load`].
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let mut launcher = Self::new(Configuration::load(path)?);
        launcher.config_path = Some(path.to_path_buf());
        Ok(launcher)
    }

    /// Add an initializer; initializers run in the order they were added
    #[must_use]
    pub fn initializer(mut self, initializer: impl Initializer + 'static) -> Self {
        self.initializers.push(Box::new(initializer));
        self
    }

    /// Register a [`DiskCache`] below the configured cache directory, after all initializers
    #[must_use]
    pub fn with_disk_cache(mut self) -> Self {
        self.disk_cache = true;
        self
    }

    /// Sink for classes carrying the relocation marker
    #[must_use]
    pub fn escape_sink(mut self, escape: Arc<dyn EscapeSink>) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Type hierarchy for frame computation
    #[must_use]
    pub fn hierarchy(mut self, hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    /// Run the start-up sequence.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the dump worker could not be started.
    pub fn launch(self, mandatory: Arc<dyn MandatoryTransform>) -> Result<Instrumentation> {
        let mut config = self.config;

        let registry = Registry::new();
        registry.open();
        for (index, initializer) in self.initializers.iter().enumerate() {
            if let Err(error) = initializer.on_initialize(&registry) {
                error!(initializer = index, %error, "Initializer failed, skipping");
            }
        }
        if self.disk_cache {
            registry.register_cache(Arc::new(DiskCache::new(config.cache_dir())));
        }
        registry.freeze();

        let mut cache = registry.select_cache(&mut config);
        if let Some(active) = &cache {
            match active.load() {
                Ok(()) => info!(cache = %active.name(), "Class cache enabled"),
                Err(error) => {
                    error!(cache = %active.name(), %error, "Failed to load class cache, disabling it");
                    cache = None;
                }
            }
        }

        let dump = if config.dump() == DumpMode::Off {
            None
        } else {
            if let Err(error) = delete_tree(config.dump_dir()) {
                debug!(dir = %config.dump_dir().display(), %error, "Could not clear dump directory");
            }
            Some(Arc::new(DumpService::start(config.dump_dir())?))
        };

        let mut builder = Pipeline::builder(&registry, mandatory)
            .cache(cache)
            .deny(config.denylist().iter().cloned());
        if let Some(escape) = self.escape {
            builder = builder.escape_sink(escape);
        }
        if let Some(hierarchy) = self.hierarchy {
            builder = builder.hierarchy(hierarchy);
        }
        if let Some(dump) = &dump {
            builder = builder.dump(dump.clone(), config.dump());
        }

        Ok(Instrumentation {
            pipeline: builder.build(),
            registry,
            config,
            config_path: self.config_path,
            dump,
        })
    }
}

/// A launched pipeline together with the state that has to be flushed on exit.
pub struct Instrumentation {
    pipeline: Pipeline,
    registry: Registry,
    config: Configuration,
    config_path: Option<PathBuf>,
    dump: Option<Arc<DumpService>>,
}

impl Instrumentation {
    /// The pipeline to call for every class load
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The frozen registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The effective configuration, including a newly selected cache
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Drain the dump queue, save the cache and persist configuration changes.
    ///
    /// # Errors
    /// Returns the first error of saving the cache or the configuration; the remaining steps
    /// still run.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(dump) = &self.dump {
            dump.shutdown();
        }

        let mut result = Ok(());
        if let Some(cache) = self.pipeline.cache() {
            if let Err(error) = cache.save() {
                warn!(cache = %cache.name(), %error, "Failed to save class cache");
                result = Err(error);
            }
        }

        if let Some(path) = &self.config_path {
            match self.config.save(path, false) {
                Ok(true) => debug!(path = %path.display(), "Configuration saved"),
                Ok(false) => {}
                Err(error) => {
                    warn!(path = %path.display(), %error, "Failed to save configuration");
                    if result.is_ok() {
                        result = Err(error);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{ClassUnit, ClassAccess, EncodeFlags},
        transform::{ClassCache, Identifier, Passthrough, TransformFlags, TransformRule},
        Error,
    };
    use std::fs;

    struct Broken(Identifier);

    impl ClassCache for Broken {
        fn name(&self) -> &Identifier {
            &self.0
        }

        fn load(&self) -> Result<()> {
            Err(Error::Transform("unreadable".to_string()))
        }

        fn save(&self) -> Result<()> {
            Ok(())
        }

        fn get(&self, _original: &[u8]) -> Result<Option<Vec<u8>>> {
            panic!("disabled cache consulted")
        }

        fn put(&self, _original: &[u8], _transformed: &[u8]) -> Result<()> {
            panic!("disabled cache written")
        }
    }

    struct Touch(Identifier);

    impl TransformRule for Touch {
        fn name(&self) -> &Identifier {
            &self.0
        }

        fn handles_class(&self, _name: &str, _loader_name: &str) -> bool {
            true
        }

        fn transform(&self, class: &mut ClassUnit, _flags: &mut TransformFlags) -> Result<bool> {
            class.interfaces.push("java/io/Serializable".to_string());
            Ok(true)
        }
    }

    fn class_bytes() -> Vec<u8> {
        ClassUnit::new(52, ClassAccess::PUBLIC, "a/B", Some("java/lang/Object".to_string()))
            .to_bytes(EncodeFlags::empty())
            .unwrap()
    }

    #[test]
    fn failing_initializer_is_skipped() {
        let instrumentation = Launcher::new(Configuration::default())
            .initializer(|_: &Registry| -> Result<()> { Err(Error::Transform("nope".to_string())) })
            .initializer(|registry: &Registry| -> Result<()> {
                registry.register_late(Arc::new(Touch(Identifier::new("test", "touch"))));
                Ok(())
            })
            .launch(Arc::new(Passthrough))
            .unwrap();

        assert_eq!(instrumentation.registry().late_rules().len(), 1);
        let bytes = instrumentation
            .pipeline()
            .transform("a.B", "a.B", class_bytes())
            .unwrap()
            .into_bytes()
            .unwrap();
        let class = ClassUnit::parse(&bytes, crate::classfile::ReaderFlags::empty()).unwrap();
        assert_eq!(class.interfaces, vec!["java/io/Serializable"]);
        instrumentation.shutdown().unwrap();
    }

    #[test]
    fn cache_load_failure_disables_cache() {
        let instrumentation = Launcher::new(Configuration::default())
            .initializer(|registry: &Registry| -> Result<()> {
                registry.register_cache(Arc::new(Broken(Identifier::new("test", "broken"))));
                Ok(())
            })
            .launch(Arc::new(Passthrough))
            .unwrap();

        assert!(instrumentation.pipeline().cache().is_none());
        assert_eq!(instrumentation.config().cache(), Some("test:broken"));
        instrumentation
            .pipeline()
            .transform("a.B", "a.B", class_bytes())
            .unwrap();
    }

    #[test]
    fn launch_persists_selection_and_clears_dump() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("classweave.toml");
        let dump_dir = dir.path().join("dump");
        fs::create_dir_all(dump_dir.join("stale")).unwrap();

        let mut config = Configuration::default();
        config.set_dump(DumpMode::Force);
        config.set_dump_dir(&dump_dir);
        config.set_cache_dir(dir.path().join("cache"));
        config.save(&config_path, true).unwrap();

        let instrumentation = Launcher::from_config_file(&config_path)
            .unwrap()
            .with_disk_cache()
            .launch(Arc::new(Passthrough))
            .unwrap();
        assert!(!dump_dir.join("stale").exists());

        instrumentation
            .pipeline()
            .transform("a.B", "a.B", class_bytes())
            .unwrap();
        instrumentation.shutdown().unwrap();

        assert!(dump_dir.join("a/B.class").exists());
        let reloaded = Configuration::load(&config_path).unwrap();
        assert_eq!(reloaded.cache(), Some("classweave:disk"));
        assert_eq!(fs::read_dir(dir.path().join("cache")).unwrap().count(), 1);
    }
}
