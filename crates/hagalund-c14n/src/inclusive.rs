#![forbid(unsafe_code)]

//! Canonical XML 1.0 namespace policy.
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//!
//! Every in-scope namespace is rendered on an element unless the nearest
//! rendered ancestor already carries the same binding. `xml:` attributes are
//! inherited the same way but written as attributes.

use crate::context::{
    is_non_redundant, DeclKey, LocalDeclarations, NamespaceContext, ToRender,
};

/// Decide what an included element emits. Rendered entries are removed from
/// `local`; whatever remains is held back by the caller.
pub fn namespaces_to_render(ctx: &NamespaceContext, local: &mut LocalDeclarations) -> ToRender {
    let mut out = ToRender::default();

    let keys: Vec<DeclKey> = local.keys().cloned().collect();
    for key in &keys {
        let Some(decl) = local.get(key) else { continue };
        let render = match key {
            DeclKey::Xml(_) => true,
            DeclKey::Namespace(_) => {
                is_non_redundant(decl, ctx.nearest_rendered(key).map(|(d, _)| d))
            }
        };
        if render {
            if let Some(decl) = local.remove(key) {
                out.push(decl);
            }
        }
    }

    for key in ctx.unrendered_keys() {
        if keys.contains(&key) {
            continue;
        }
        if let Some(decl) = ctx.inherited_to_render(&key) {
            out.push(decl);
        }
    }
    out
}
