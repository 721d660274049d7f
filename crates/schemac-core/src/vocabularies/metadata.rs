//! Annotation keywords: recognised, never validated

use super::Vocabulary;

pub fn vocabulary() -> Vocabulary {
    [
        "title",
        "description",
        "default",
        "deprecated",
        "readOnly",
        "writeOnly",
        "examples",
        "contentMediaType",
        "contentEncoding",
        "contentSchema",
    ]
    .into_iter()
    .map(Into::into)
    .collect()
}
