use crate::value::{PatchNode, Record};

/// Apply `patch` to `mirror` in place and return it.
///
/// A nested patch value is merged into the mirror's nested record at that field,
/// which is created empty if absent and replaces a scalar if one is there.
/// Fields the patch does not name are left alone. A scalar patch value overwrites
/// the field outright, nested record included.
pub fn deep_merge<'a>(mirror: &'a mut Record, patch: &Record) -> &'a mut Record {
    for (field, node) in patch.iter() {
        match node {
            PatchNode::Nested(children) => {
                deep_merge(mirror.nested_mut(field), children);
            }
            PatchNode::Scalar(value) => {
                mirror.insert(field, value.clone());
            }
        }
    }
    mirror
}
