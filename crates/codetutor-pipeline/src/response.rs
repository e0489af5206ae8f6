//! Parse-then-validate for LLM replies. Every structural problem becomes a
//! `MalformedResponse`, which the stages treat as retryable.

use crate::state::BatchAbstraction;
use codetutor_core::{RelationshipAnalysis, RelationshipEdge, Result, TutorError};
use serde_yaml::{Mapping, Value};
use tracing::warn;

/// The YAML body of a reply: the first ```yaml fenced block if present,
/// otherwise the whole reply.
pub fn extract_yaml(response: &str) -> &str {
    for fence in ["```yaml", "```yml"] {
        if let Some(start) = response.find(fence) {
            let body = &response[start + fence.len()..];
            return match body.find("```") {
                Some(end) => body[..end].trim(),
                None => body.trim(),
            };
        }
    }
    response.trim()
}

pub fn parse_yaml(response: &str) -> Result<Value> {
    serde_yaml::from_str(extract_yaml(response))
        .map_err(|e| TutorError::malformed(format!("response is not valid YAML: {}", e)))
}

/// Index written as `3` or `"3 # Name"`.
pub fn parse_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.split('#').next()?.trim().parse().ok(),
        _ => None,
    }
}

fn field<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn text_field(map: &Mapping, key: &str) -> Option<String> {
    let text = match field(map, key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Abstractions from one identification batch. Items that are missing a
/// field are dropped with a warning; a reply that is not a YAML list at all
/// is malformed.
pub fn parse_batch_abstractions(response: &str, batch_len: usize) -> Result<Vec<BatchAbstraction>> {
    let value = parse_yaml(response)?;
    let Value::Sequence(items) = value else {
        return Err(TutorError::malformed("expected a YAML list of abstractions"));
    };

    let mut parsed = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match parse_batch_item(item, batch_len) {
            Some(abstraction) => parsed.push(abstraction),
            None => warn!("Dropping malformed abstraction #{} from batch reply", i),
        }
    }
    Ok(parsed)
}

fn parse_batch_item(item: &Value, batch_len: usize) -> Option<BatchAbstraction> {
    let map = item.as_mapping()?;
    let name = text_field(map, "name")?;
    let description = text_field(map, "description")?;
    let Value::Sequence(indices) = field(map, "file_indices")? else {
        return None;
    };

    let mut local_files = Vec::with_capacity(indices.len());
    for raw in indices {
        match parse_index(raw) {
            Some(idx) if idx < batch_len => local_files.push(idx),
            _ => warn!("Abstraction '{}' lists unusable file index {:?}", name, raw),
        }
    }
    local_files.sort_unstable();
    local_files.dedup();

    Some(BatchAbstraction {
        name,
        description,
        local_files,
    })
}

/// Summary plus relationship edges; every edge must reference one of the
/// `abstraction_count` abstractions.
pub fn parse_relationships(response: &str, abstraction_count: usize) -> Result<RelationshipAnalysis> {
    let value = parse_yaml(response)?;
    let map = value
        .as_mapping()
        .ok_or_else(|| TutorError::malformed("expected a YAML mapping with summary and relationships"))?;

    let summary = text_field(map, "summary")
        .ok_or_else(|| TutorError::malformed("missing 'summary'"))?;
    let Some(Value::Sequence(items)) = field(map, "relationships") else {
        return Err(TutorError::malformed("missing 'relationships' list"));
    };

    let mut edges = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let map = item
            .as_mapping()
            .ok_or_else(|| TutorError::malformed(format!("relationship #{} is not a mapping", i)))?;
        let index = |key: &str| {
            field(map, key).and_then(parse_index).ok_or_else(|| {
                TutorError::malformed(format!("relationship #{} has no valid '{}'", i, key))
            })
        };
        let from = index("from_abstraction")?;
        let to = index("to_abstraction")?;
        let label = text_field(map, "label")
            .ok_or_else(|| TutorError::malformed(format!("relationship #{} has no label", i)))?;
        edges.push(RelationshipEdge { from, to, label });
    }

    let analysis = RelationshipAnalysis { summary, edges };
    analysis.validate(abstraction_count)?;
    Ok(analysis)
}

/// The raw index list of an ordering reply. Permutation checking is left to
/// `ChapterOrder::new`.
pub fn parse_order(response: &str) -> Result<Vec<usize>> {
    let value = parse_yaml(response)?;
    let Value::Sequence(items) = value else {
        return Err(TutorError::malformed("expected a YAML list of abstraction indices"));
    };

    items
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            parse_index(raw).ok_or_else(|| {
                TutorError::malformed(format!("order entry #{} is not an index: {:?}", i, raw))
            })
        })
        .collect()
}
