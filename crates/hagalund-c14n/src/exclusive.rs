#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 namespace policy.
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//!
//! Only visibly utilized namespaces are rendered: the prefix of the element
//! name and the prefixes of its rendered attributes. Prefixes named in the
//! InclusiveNamespaces PrefixList (`#default` for the default namespace) are
//! handled like plain C14N. `xml:` attributes are ordinary attributes here
//! and never inherited.

use crate::context::{is_non_redundant, DeclKey, LocalDeclarations, NamespaceContext, ToRender};
use hagalund_core::{ns, Error};
use std::collections::BTreeSet;

/// Decide what an included element emits.
///
/// `used_prefixes` holds the element prefix and the prefixes of its rendered
/// attributes. Rendered entries are removed from `local`.
pub fn namespaces_to_render(
    ctx: &NamespaceContext,
    local: &mut LocalDeclarations,
    used_prefixes: &[&str],
    inclusive_prefixes: &BTreeSet<String>,
) -> ToRender {
    let mut out = ToRender::default();

    let candidates = used_prefixes
        .iter()
        .map(|p| p.to_string())
        .chain(inclusive_prefixes.iter().cloned())
        .filter(|p| p != "xml" && p != "xmlns");

    for prefix in candidates {
        let key = DeclKey::Namespace(prefix);
        if out.renders(&key) {
            continue;
        }
        if let Some(decl) = local.get(&key) {
            if is_non_redundant(decl, ctx.nearest_rendered(&key).map(|(d, _)| d)) {
                if let Some(decl) = local.remove(&key) {
                    out.push(decl);
                }
            }
        } else if let Some(decl) = ctx.inherited_to_render(&key) {
            out.push(decl);
        }
    }
    out
}

/// Parse an InclusiveNamespaces PrefixList into the internal key form.
///
/// Every token must be `#default` or an NCName.
pub fn parse_prefix_list<S: AsRef<str>>(prefixes: &[S]) -> Result<BTreeSet<String>, Error> {
    prefixes
        .iter()
        .flat_map(|p| p.as_ref().split_ascii_whitespace())
        .map(|p| {
            if p == ns::DEFAULT_PREFIX_TOKEN {
                Ok(String::new())
            } else if is_ncname(p) {
                Ok(p.to_owned())
            } else {
                Err(Error::Canonicalization(format!(
                    "{p:?} in InclusiveNamespaces PrefixList is not a prefix"
                )))
            }
        })
        .collect()
}

fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
