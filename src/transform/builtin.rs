//! Built-in rule and marker names.

use tracing::debug;

use crate::{
    classfile::ClassUnit,
    transform::{Identifier, TransformFlags, TransformRule},
    Result,
};

/// Class annotation that has the finished class handed to the
/// [`crate::transform::EscapeSink`] instead of the requesting loader
pub const RELOCATION_MARKER: &str = "Lclassweave/api/ForceRelocation;";

/// Method annotation that becomes the JVM's own `ForceInline` on relocated classes
pub const FORCE_INLINE: &str = "Lclassweave/api/ForceInline;";

/// The JVM-internal inlining annotation, only honoured for classes defined by the boot loader
pub const JVM_FORCE_INLINE: &str = "Ljdk/internal/vm/annotation/ForceInline;";

/// Class name prefixes that never see any rule, in addition to the configured denylist
pub const BUILTIN_DENYLIST: &[&str] = &["classweave."];

/// Late rule appended for classes carrying [`RELOCATION_MARKER`].
///
/// Strips the marker itself and rewrites [`FORCE_INLINE`] method annotations into
/// [`JVM_FORCE_INLINE`].
#[derive(Debug)]
pub struct RelocationRule {
    name: Identifier,
}

impl Default for RelocationRule {
    fn default() -> Self {
        RelocationRule {
            name: Identifier::new("classweave", "relocation"),
        }
    }
}

impl TransformRule for RelocationRule {
    fn name(&self) -> &Identifier {
        &self.name
    }

    // Only ever scheduled for marked classes.
    fn handles_class(&self, _name: &str, _loader_name: &str) -> bool {
        true
    }

    fn transform(&self, class: &mut ClassUnit, _flags: &mut TransformFlags) -> Result<bool> {
        let mut changed = class.remove_annotations(RELOCATION_MARKER);

        for method in &mut class.methods {
            if method.annotations.rename_type(FORCE_INLINE, JVM_FORCE_INLINE) {
                debug!(class = %class.name, method = %method.name, "Promoted ForceInline");
                changed = true;
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{Annotation, ClassAccess, MethodAccess, MethodUnit};

    #[test]
    fn strips_marker_and_promotes_inline() {
        let mut class = ClassUnit::new(52, ClassAccess::PUBLIC, "a/B", None);
        class.add_annotations(false, vec![Annotation::marker(RELOCATION_MARKER)]);
        let mut method = MethodUnit::new(MethodAccess::STATIC, "hot", "()V");
        method.add_annotations(false, vec![Annotation::marker(FORCE_INLINE)]);
        class.methods.push(method);
        class
            .methods
            .push(MethodUnit::new(MethodAccess::STATIC, "cold", "()V"));

        let rule = RelocationRule::default();
        let mut flags = TransformFlags::default();
        assert!(rule.transform(&mut class, &mut flags).unwrap());

        assert!(!class.has_annotation(RELOCATION_MARKER));
        assert!(class.methods[0].has_annotation(JVM_FORCE_INLINE));
        assert!(!class.methods[0].has_annotation(FORCE_INLINE));
        assert_eq!(flags, TransformFlags::default());

        // nothing left to do
        assert!(!rule.transform(&mut class, &mut flags).unwrap());
    }
}
