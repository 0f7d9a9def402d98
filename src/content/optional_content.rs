//! Optional content group visibility.
//!
//! Drawing wrapped in a BDC whose properties reference an OCG or OCMD is
//! suppressed when the group evaluates hidden under the active usage
//! event ("View" or "Print"). Cyclic OCG/OCMD references are broken with
//! a marking set; an object already under evaluation counts as visible.

use crate::document::Document;
use crate::object::{Dict, DictExt, ObjRef, Object};
use std::collections::HashSet;

/// The document's optional-content configuration.
#[derive(Debug, Clone, Default)]
pub struct OptionalContent {
    /// Object numbers of OCGs whose base state is OFF
    off: HashSet<u32>,
    /// Whether the document declares optional content at all
    present: bool,
}

impl OptionalContent {
    /// Build from the catalog's /OCProperties.
    pub fn load(doc: &mut Document) -> OptionalContent {
        let mut out = OptionalContent::default();
        let Ok(catalog) = doc.catalog() else {
            return out;
        };
        let Ok(Object::Dict(props)) = doc.resolve_key(&catalog, "OCProperties") else {
            return out;
        };
        out.present = true;

        let Ok(config) = doc.resolve_key(&props, "D") else {
            return out;
        };
        if let Some(config) = config.as_dict() {
            if config.get_name("BaseState") == Some("OFF") {
                // All groups default off; the ON array re-enables
                if let Ok(Object::Array(ocgs)) = doc.resolve_key(&props, "OCGs") {
                    for ocg in &ocgs {
                        if let Some(re) = ocg.as_ref() {
                            out.off.insert(re.num);
                        }
                    }
                }
                if let Some(on) = config.get_array("ON") {
                    for ocg in on {
                        if let Some(re) = ocg.as_ref() {
                            out.off.remove(&re.num);
                        }
                    }
                }
            } else if let Some(off) = config.get_array("OFF") {
                for ocg in off {
                    if let Some(re) = ocg.as_ref() {
                        out.off.insert(re.num);
                    }
                }
            }
        }
        out
    }

    /// Evaluate visibility of an OCG/OCMD reference under `event`.
    pub fn is_hidden(&self, doc: &mut Document, obj: &Object, event: &str) -> bool {
        if !self.present && obj.as_ref().is_none() {
            // Inline dictionaries still evaluate; plain absence is visible
            if obj.as_dict().is_none() {
                return false;
            }
        }
        let mut marks = HashSet::new();
        self.hidden_inner(doc, obj, event, &mut marks)
    }

    fn hidden_inner(
        &self,
        doc: &mut Document,
        obj: &Object,
        event: &str,
        marks: &mut HashSet<u32>,
    ) -> bool {
        // Cycle break: an object under evaluation is treated as visible
        if let Some(re) = obj.as_ref() {
            if !marks.insert(re.num) {
                return false;
            }
        }
        let re = obj.as_ref();
        let Ok(resolved) = doc.resolve(obj) else {
            return false;
        };
        let Some(dict) = resolved.as_dict() else {
            return false;
        };
        let dict = dict.clone();

        match dict.get_name("Type") {
            Some("OCMD") => self.hidden_ocmd(doc, &dict, event, marks),
            _ => self.hidden_ocg(doc, &dict, re, event),
        }
    }

    fn hidden_ocg(
        &self,
        doc: &mut Document,
        dict: &Dict,
        re: Option<ObjRef>,
        event: &str,
    ) -> bool {
        // Intent must include View, All, or the active event
        if let Some(intent) = dict.get("Intent") {
            let matches_intent = |name: &str| name == "View" || name == "All" || name == event;
            let ok = match intent {
                Object::Name(n) => matches_intent(n.as_str()),
                Object::Array(arr) => arr
                    .iter()
                    .filter_map(Object::as_name)
                    .any(matches_intent),
                _ => true,
            };
            if !ok {
                return true;
            }
        }

        // Usage override for the event, then the base state
        if let Ok(Object::Dict(usage)) = doc.resolve_key(dict, "Usage") {
            if let Ok(Object::Dict(ev)) = doc.resolve_key(&usage, event) {
                let key = format!("{event}State");
                match ev.get_name(&key) {
                    Some("OFF") => return true,
                    Some("ON") => return false,
                    _ => {},
                }
            }
        }

        re.is_some_and(|r| self.off.contains(&r.num))
    }

    fn hidden_ocmd(
        &self,
        doc: &mut Document,
        dict: &Dict,
        event: &str,
        marks: &mut HashSet<u32>,
    ) -> bool {
        // /VE visibility expression takes precedence
        if let Ok(Object::Array(ve)) = doc.resolve_key(dict, "VE") {
            return !self.eval_ve(doc, &ve, event, marks);
        }

        let ocgs = match doc.resolve_key(dict, "OCGs") {
            Ok(Object::Array(arr)) => arr,
            Ok(Object::Dict(_)) | Ok(Object::Ref(_)) => {
                vec![dict.get("OCGs").cloned().unwrap_or(Object::Null)]
            },
            _ => Vec::new(),
        };
        if ocgs.is_empty() {
            return false;
        }

        let hidden: Vec<bool> = ocgs
            .iter()
            .map(|ocg| self.hidden_inner(doc, ocg, event, marks))
            .collect();

        match dict.get_name("P").unwrap_or("AnyOn") {
            "AllOn" => hidden.iter().any(|&h| h),
            "AnyOn" => hidden.iter().all(|&h| h),
            "AnyOff" => hidden.iter().all(|&h| !h),
            "AllOff" => hidden.iter().any(|&h| !h),
            other => {
                log::warn!("unknown OCMD /P {other}, using AnyOn");
                hidden.iter().all(|&h| h)
            },
        }
    }

    /// Evaluate a /VE expression; returns visibility.
    fn eval_ve(
        &self,
        doc: &mut Document,
        ve: &[Object],
        event: &str,
        marks: &mut HashSet<u32>,
    ) -> bool {
        let Some(op) = ve.first().and_then(Object::as_name) else {
            return true;
        };
        let operands = &ve[1..];
        let mut visible = |obj: &Object| -> bool {
            match obj {
                Object::Array(inner) => self.eval_ve(doc, inner, event, marks),
                other => !self.hidden_inner(doc, other, event, marks),
            }
        };
        match op {
            "Not" => operands.first().map_or(true, |o| !visible(o)),
            "And" => operands.iter().all(&mut visible),
            "Or" => operands.iter().any(&mut visible),
            other => {
                log::warn!("unknown /VE operator {other}");
                true
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;
    use bytes::Bytes;

    fn doc() -> Document {
        let pdf = crate::document::test_pdf("0 0 100 100", "");
        Document::from_bytes(Bytes::from(pdf)).unwrap()
    }

    fn ocg_with_usage(event: &str, state: &str) -> Dict {
        let mut ev = Dict::new();
        ev.insert(
            Name::new(format!("{event}State").as_str()),
            Object::Name(state.into()),
        );
        let mut usage = Dict::new();
        usage.insert(Name::new(event), Object::Dict(ev));
        let mut ocg = Dict::new();
        ocg.insert(Name::new("Type"), Object::Name("OCG".into()));
        ocg.insert(Name::new("Name"), Object::String(b"Layer".to_vec()));
        ocg.insert(Name::new("Usage"), Object::Dict(usage));
        ocg
    }

    #[test]
    fn test_no_optional_content_everything_visible() {
        let mut doc = doc();
        let oc = OptionalContent::load(&mut doc);
        assert!(!oc.is_hidden(&mut doc, &Object::Null, "View"));
    }

    #[test]
    fn test_usage_state_off_hides_for_event() {
        let mut doc = doc();
        let oc = OptionalContent::default();
        let ocg = Object::Dict(ocg_with_usage("Print", "OFF"));
        assert!(oc.is_hidden(&mut doc, &ocg, "Print"));
        // The same group is visible under View (no View usage entry)
        assert!(!oc.is_hidden(&mut doc, &ocg, "View"));
    }

    #[test]
    fn test_intent_mismatch_hides() {
        let mut doc = doc();
        let oc = OptionalContent::default();
        let mut ocg = Dict::new();
        ocg.insert(Name::new("Type"), Object::Name("OCG".into()));
        ocg.insert(Name::new("Intent"), Object::Name("Design".into()));
        assert!(oc.is_hidden(&mut doc, &Object::Dict(ocg), "View"));
    }

    #[test]
    fn test_ocmd_anyon_default() {
        let mut doc = doc();
        let oc = OptionalContent::default();
        let mut ocmd = Dict::new();
        ocmd.insert(Name::new("Type"), Object::Name("OCMD".into()));
        // No OCGs: visible
        assert!(!oc.is_hidden(&mut doc, &Object::Dict(ocmd), "View"));
    }
}
