//! End-to-end tests of the transformation pipeline.
//!
//! Classes are built in memory, run through a [`Pipeline`] assembled from a frozen registry
//! and decoded again to check what the rules did.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use classweave::{
    prelude::*,
    transform::DiskCache,
};

const NOISY: &str = "Lcom/example/Noisy;";

fn static_method(name: &str, desc: &str, code: InstructionSequence, max_locals: u16) -> MethodUnit {
    let mut method = MethodUnit::new(MethodAccess::PUBLIC | MethodAccess::STATIC, name, desc);
    method.code = Some(Code {
        max_locals,
        instructions: code,
        ..Code::default()
    });
    method
}

fn service_class(annotated: bool) -> Vec<u8> {
    let mut class = ClassUnit::new(
        52,
        ClassAccess::PUBLIC | ClassAccess::SUPER,
        "com/example/Service",
        Some("java/lang/Object".to_string()),
    );
    if annotated {
        class.add_annotations(true, vec![Annotation::marker(NOISY)]);
    }

    let mut body = InstructionSequence::new();
    body.push_back(Instruction::simple(opcodes::RETURN));
    class.methods.push(static_method("run", "(I)V", body, 1));

    class.to_bytes(EncodeFlags::empty()).unwrap()
}

/// Removes the `Noisy` annotation and counts its invocations.
struct Quiet {
    name: Identifier,
    calls: AtomicUsize,
}

impl Quiet {
    fn new() -> Arc<Self> {
        Arc::new(Quiet {
            name: Identifier::new("test", "quiet"),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TransformRule for Quiet {
    fn name(&self) -> &Identifier {
        &self.name
    }

    fn handles_class(&self, name: &str, _loader_name: &str) -> bool {
        name.starts_with("com.example.")
    }

    fn transform(&self, class: &mut ClassUnit, _flags: &mut TransformFlags) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(class.remove_annotations(NOISY))
    }
}

/// Guards the body of `run` with `if (arg == 0) { String s = "x"; }`, which needs a frame.
struct Guard(Identifier);

impl TransformRule for Guard {
    fn name(&self) -> &Identifier {
        &self.0
    }

    fn handles_class(&self, _name: &str, _loader_name: &str) -> bool {
        true
    }

    fn transform(&self, class: &mut ClassUnit, flags: &mut TransformFlags) -> Result<bool> {
        let Some(code) = class
            .find_method_mut("run", "(I)V")
            .and_then(|method| method.code.as_mut())
        else {
            return Ok(false);
        };

        let seq = &mut code.instructions;
        let skip = seq.new_label();
        let Some(first) = seq.first() else {
            return Ok(false);
        };
        seq.insert_all_before(
            first,
            vec![
                Instruction::var(opcodes::ILOAD, 0),
                Instruction::jump(opcodes::IFEQ, skip),
                Instruction::ldc(Constant::String("x".to_string())),
                Instruction::var(opcodes::ASTORE, 1),
                Instruction::Label(skip),
            ],
        );
        flags.request_frames();
        Ok(true)
    }
}

fn frozen(early: Vec<Arc<dyn TransformRule>>, caches: Vec<Arc<dyn ClassCache>>) -> Registry {
    let registry = Registry::new();
    registry.open();
    for rule in early {
        registry.register_early(rule);
    }
    for cache in caches {
        registry.register_cache(cache);
    }
    registry.freeze();
    registry
}

#[test]
fn rule_output_is_cached_under_original_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let quiet = Quiet::new();
    let cache: Arc<dyn ClassCache> = Arc::new(DiskCache::new(dir.path()));
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], vec![cache.clone()]);
    let pipeline = Pipeline::builder(&registry, Arc::new(Passthrough))
        .cache(Some(cache.clone()))
        .build();

    let original = service_class(true);
    let transformed = pipeline
        .transform("com.example.Service", "com.example.Service", original.clone())
        .unwrap()
        .into_bytes()
        .unwrap();

    let class = ClassUnit::parse(&transformed, ReaderFlags::empty()).unwrap();
    assert!(!class.has_annotation(NOISY));
    assert!(class.find_method("run", "(I)V").is_some());
    assert_eq!(cache.get(&original).unwrap(), Some(transformed));
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_requests_pass_through() {
    let quiet = Quiet::new();
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], Vec::new());
    let pipeline = Pipeline::builder(&registry, Arc::new(Passthrough)).build();

    let original = service_class(true);
    let first = pipeline
        .transform("com.example.Service", "com.example.Service", original.clone())
        .unwrap();
    assert_ne!(first, LoadOutcome::Bytes(original.clone()));

    let second = pipeline
        .transform("com.example.Service", "com.example.Service", original.clone())
        .unwrap();
    assert_eq!(second, LoadOutcome::Bytes(original));
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 1);
    assert!(pipeline.has_seen("com.example.Service"));
}

#[test]
fn cache_hit_skips_all_work() {
    let dir = tempfile::tempdir().unwrap();
    let original = service_class(true);
    let cache: Arc<dyn ClassCache> = Arc::new(DiskCache::new(dir.path()));
    cache.put(&original, b"cached").unwrap();

    let mandatory_calls = Arc::new(AtomicUsize::new(0));
    let counter = mandatory_calls.clone();
    let mandatory: Arc<dyn MandatoryTransform> =
        Arc::new(move |_: &str, _: &str, bytes: Vec<u8>| -> Result<Vec<u8>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(bytes)
        });

    let quiet = Quiet::new();
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], vec![cache.clone()]);
    let pipeline = Pipeline::builder(&registry, mandatory)
        .cache(Some(cache))
        .build();

    let outcome = pipeline
        .transform("com.example.Service", "com.example.Service", original)
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Bytes(b"cached".to_vec()));
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 0);
    assert_eq!(mandatory_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn requested_frames_are_recomputed() {
    let guard: Arc<dyn TransformRule> = Arc::new(Guard(Identifier::new("test", "guard")));
    let registry = frozen(vec![guard], Vec::new());
    let pipeline = Pipeline::builder(&registry, Arc::new(Passthrough)).build();

    let bytes = pipeline
        .transform("com.example.Service", "com.example.Service", service_class(false))
        .unwrap()
        .into_bytes()
        .unwrap();

    let class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    let code = class
        .find_method("run", "(I)V")
        .and_then(|method| method.code.as_ref())
        .unwrap();
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 2);

    let frames: Vec<&Frame> = code
        .instructions
        .instructions()
        .filter_map(|insn| match insn {
            Instruction::Frame(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(
        frames,
        vec![&Frame {
            locals: vec![VerificationType::Integer],
            stack: Vec::new(),
        }]
    );
}

#[test]
fn concurrent_requests_transform_once() {
    const THREADS: usize = 8;

    let quiet = Quiet::new();
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], Vec::new());
    let pipeline = Pipeline::builder(&registry, Arc::new(Passthrough)).build();
    let original = service_class(true);
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<LoadOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    pipeline
                        .transform("com.example.Service", "com.example.Service", original.clone())
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(quiet.calls.load(Ordering::SeqCst), 1);
    let untouched = outcomes
        .iter()
        .filter(|outcome| **outcome == LoadOutcome::Bytes(original.clone()))
        .count();
    assert_eq!(untouched, THREADS - 1);
}

#[test]
fn rules_see_only_matching_classes() {
    let quiet = Quiet::new();
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], Vec::new());
    let pipeline = Pipeline::builder(&registry, Arc::new(Passthrough))
        .deny(["com.example.internal."])
        .build();

    let original = service_class(true);
    let outcome = pipeline
        .transform("org.other.Service", "org.other.Service", original.clone())
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Bytes(original.clone()));

    let outcome = pipeline
        .transform("com.example.internal.Service", "com.example.internal.Service", original.clone())
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Bytes(original));
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 0);
}

/// A cache whose storage is gone: every lookup and write fails.
struct Unreachable {
    name: Identifier,
    attempts: AtomicUsize,
}

impl ClassCache for Unreachable {
    fn name(&self) -> &Identifier {
        &self.name
    }

    fn load(&self) -> Result<()> {
        Ok(())
    }

    fn save(&self) -> Result<()> {
        Ok(())
    }

    fn get(&self, _original: &[u8]) -> Result<Option<Vec<u8>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::FileError(std::io::Error::other("cache volume unmounted")))
    }

    fn put(&self, _original: &[u8], _transformed: &[u8]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::FileError(std::io::Error::other("cache volume unmounted")))
    }
}

/// Host transform that makes every class `Serializable`.
fn serializable() -> Arc<dyn MandatoryTransform> {
    Arc::new(|_: &str, _: &str, bytes: Vec<u8>| -> Result<Vec<u8>> {
        let mut class = ClassUnit::parse(&bytes, ReaderFlags::empty())?;
        class.interfaces.push("java/io/Serializable".to_string());
        class.to_bytes(EncodeFlags::empty())
    })
}

#[test]
fn cache_failures_degrade_to_miss() {
    let cache = Arc::new(Unreachable {
        name: Identifier::new("test", "unreachable"),
        attempts: AtomicUsize::new(0),
    });
    let quiet = Quiet::new();
    let registry = frozen(
        vec![quiet.clone() as Arc<dyn TransformRule>],
        vec![cache.clone() as Arc<dyn ClassCache>],
    );
    let pipeline = Pipeline::builder(&registry, serializable())
        .cache(Some(cache.clone() as Arc<dyn ClassCache>))
        .build();

    let outcome = pipeline
        .transform("com.example.Service", "com.example.Service", service_class(true))
        .unwrap();
    let LoadOutcome::Bytes(bytes) = outcome else {
        panic!("class was redirected");
    };

    let class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    assert!(!class.has_annotation(NOISY));
    assert_eq!(class.interfaces, vec!["java/io/Serializable"]);
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn rule_edits_combine_with_host_transform() {
    let quiet = Quiet::new();
    let registry = frozen(vec![quiet.clone() as Arc<dyn TransformRule>], Vec::new());
    let pipeline = Pipeline::builder(&registry, serializable()).build();

    let bytes = pipeline
        .transform("com.example.Service", "com.example.Service", service_class(true))
        .unwrap()
        .into_bytes()
        .unwrap();

    let mut expected = ClassUnit::parse(&service_class(false), ReaderFlags::empty()).unwrap();
    expected.interfaces.push("java/io/Serializable".to_string());

    let class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    assert!(!class.has_annotation(NOISY));
    assert_eq!(class.interfaces, expected.interfaces);
    assert_eq!(class.name, expected.name);
    assert!(class.find_method("run", "(I)V").is_some());
    assert_eq!(quiet.calls.load(Ordering::SeqCst), 1);
}
