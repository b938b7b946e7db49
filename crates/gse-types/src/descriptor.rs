//! Learning-objective and grammar descriptor records.
//!
//! Both exports share one shape and differ only in how
//! `grammaticalCategories` is nested, so a single generic [`Descriptor`]
//! covers them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    pub syllabus_name: String,
    pub syllabus_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub tag_name: String,
    pub tag_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagType {
    pub tag_type_id: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub ps: String,
    pub isbn: String,
}

/// Scope-and-development framework row attached to some objectives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sdf {
    pub sort_competency: String,
    pub skill: String,
    pub strand: String,
    pub sub_strand: String,
    pub competency: String,
    #[serde(rename = "development_indicator")]
    pub development_indicator: String,
    #[serde(default)]
    pub di_range: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedDescriptor {
    pub descriptive_id: String,
    pub descriptor: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupation {
    pub soc_code: String,
    pub title: String,
    pub family: String,
    #[serde(default)]
    pub descriptors: Vec<String>,
}

/// Free-form metadata block. Exports spell keys as `"Variant terms"`,
/// `"Variant_terms"` or `"Function/Notion"`; [`AdditionalInformation::get`]
/// accepts any of these spellings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalInformation(pub BTreeMap<String, Option<String>>);

impl AdditionalInformation {
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = normalize_key(key);
        self.0
            .iter()
            .find(|(k, _)| normalize_key(k) == wanted)
            .and_then(|(_, v)| v.as_deref())
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().replace(' ', "_").replace('/', "_or_")
}

/// Shared descriptor shape; `G` is the `grammaticalCategories` layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor<G> {
    pub descriptor_id: String,
    pub descriptive_id: String,
    pub descriptor: String,
    pub attribution: String,
    #[serde(default)]
    pub syllabuses: Vec<Syllabus>,
    #[serde(default)]
    pub related_descriptors: Vec<RelatedDescriptor>,
    pub descriptor_status: String,
    #[serde(default)]
    pub additional_information: AdditionalInformation,
    #[serde(default)]
    pub tags: Vec<TagType>,
    #[serde(default)]
    pub occupations: Vec<Occupation>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub sdf: Vec<Sdf>,
    #[serde(default, rename = "relatedLOs")]
    pub related_los: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub di: Option<String>,
    pub status: bool,
    pub created: String,
    pub created_by: User,
    pub updated: String,
    pub updated_by: User,
    #[serde(default)]
    pub gse: Vec<TagType>,
    pub grammatical_categories: G,
    #[serde(default)]
    pub business_skills: Vec<Vec<String>>,
    #[serde(default)]
    pub communicative_categories: Vec<Vec<String>>,
}

pub type LearningObjective = Descriptor<Vec<String>>;

pub type GrammarDescriptor = Descriptor<Vec<Vec<String>>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_json(categories: &str) -> String {
        format!(
            r#"{{
                "descriptorId": "d1", "descriptiveId": "GSE-1", "descriptor": "Can use 'some'.",
                "attribution": "GSE", "descriptorStatus": "published",
                "additionalInformation": {{"Variant terms": "any", "Function/Notion": null, "Batch": "7"}},
                "relatedLOs": {{"GL": ["x"], "YL": []}},
                "status": true, "created": "2020-01-01", "updated": "2021-01-01",
                "createdBy": {{"userId": "u", "firstName": "A", "lastName": "B"}},
                "updatedBy": {{"userId": "u", "firstName": "A", "lastName": "B"}},
                "grammaticalCategories": {categories}
            }}"#
        )
    }

    #[test]
    fn parses_grammar_descriptor_with_nested_categories() {
        let grammar: GrammarDescriptor =
            serde_json::from_str(&descriptor_json(r#"[["determiner", "quantifier"]]"#)).unwrap();
        assert_eq!(grammar.grammatical_categories[0][1], "quantifier");
        assert_eq!(grammar.related_los["GL"], vec!["x"]);
        assert!(grammar.books.is_empty());
    }

    #[test]
    fn parses_learning_objective_with_flat_categories() {
        let objective: LearningObjective =
            serde_json::from_str(&descriptor_json(r#"["determiner"]"#)).unwrap();
        assert_eq!(objective.grammatical_categories, vec!["determiner"]);
    }

    #[test]
    fn additional_information_matches_key_spellings() {
        let objective: LearningObjective =
            serde_json::from_str(&descriptor_json("[]")).unwrap();
        let info = &objective.additional_information;
        assert_eq!(info.get("Variant_terms"), Some("any"));
        assert_eq!(info.get("Variant terms"), Some("any"));
        assert_eq!(info.get("Function_or_Notion"), None);
        assert_eq!(info.get("Batch"), Some("7"));
    }
}
