//! Keyword rules grouped by the data type they apply to
//!
//! Groups run in a fixed order: keywords for any type first, then number,
//! string, array and object keywords, and finally the `post` group
//! (`unevaluatedProperties`, `unevaluatedItems`). Within a group keywords run
//! in registration order unless a definition asks to run `before` another.

use super::data_type::JsonType;
use crate::vocabularies::{KeywordDefinition, Vocabulary, VocabularyEntry};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A keyword with code in one group
#[derive(Clone)]
pub struct Rule {
    pub keyword: String,
    pub def: Arc<KeywordDefinition>,
}

/// Keywords applying to one data type, or to any type when `ty` is `None`
#[derive(Clone, Default)]
pub struct RuleGroup {
    pub ty: Option<JsonType>,
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    fn new(ty: Option<JsonType>) -> Self {
        Self { ty, rules: Vec::new() }
    }

    /// Whether the schema has any keyword of this group
    pub fn is_used_by(&self, schema: &Value) -> bool {
        self.rules.iter().any(|rule| should_use_rule(schema, rule))
    }
}

/// Whether the keyword, or one it implements, is present in the schema
pub fn should_use_rule(schema: &Value, rule: &Rule) -> bool {
    schema.get(&rule.keyword).is_some() || rule.def.implements.iter().any(|k| schema.get(k).is_some())
}

/// The keyword registry of one compiler
#[derive(Clone)]
pub struct Rules {
    groups: Vec<RuleGroup>,
    post: RuleGroup,
    all: HashMap<String, Rule>,
    /// Every recognised keyword, with or without code
    keywords: HashSet<String>,
}

impl Default for Rules {
    fn default() -> Self {
        Self::new()
    }
}

impl Rules {
    pub fn new() -> Self {
        Self {
            groups: vec![
                RuleGroup::new(None),
                RuleGroup::new(Some(JsonType::Number)),
                RuleGroup::new(Some(JsonType::String)),
                RuleGroup::new(Some(JsonType::Array)),
                RuleGroup::new(Some(JsonType::Object)),
            ],
            post: RuleGroup::new(None),
            all: HashMap::new(),
            keywords: HashSet::new(),
        }
    }

    /// Registry populated with the given vocabularies, in order
    pub fn with_vocabularies(vocabularies: impl IntoIterator<Item = Vocabulary>) -> Result<Self> {
        let mut rules = Self::new();
        for vocabulary in vocabularies {
            rules.add_vocabulary(vocabulary)?;
        }
        Ok(rules)
    }

    pub fn add_vocabulary(&mut self, vocabulary: Vocabulary) -> Result<()> {
        for entry in vocabulary {
            match entry {
                VocabularyEntry::Known(keyword) => self.add_known(&keyword)?,
                VocabularyEntry::Keyword(def) => self.add(def)?,
            }
        }
        Ok(())
    }

    /// Recognise a keyword that generates no code
    pub fn add_known(&mut self, keyword: &str) -> Result<()> {
        check_keyword_name(keyword)?;
        if !self.keywords.insert(keyword.to_string()) {
            return Err(Error::keyword(keyword, format!("Keyword {} is already defined", keyword)));
        }
        Ok(())
    }

    /// Add a keyword definition to the groups of its types
    pub fn add(&mut self, def: KeywordDefinition) -> Result<()> {
        let keyword = def.keyword.clone();
        check_keyword_name(&keyword)?;
        if self.keywords.contains(&keyword) {
            return Err(Error::keyword(&keyword, format!("Keyword {} is already defined", keyword)));
        }
        if def.post && !def.types.is_empty() {
            return Err(Error::keyword(&keyword, "keyword with \"post\" flag cannot have \"type\""));
        }
        let def = Arc::new(def);
        let rule = Rule {
            keyword: keyword.clone(),
            def: def.clone(),
        };
        if def.post {
            insert_rule(&mut self.post, rule.clone(), def.before.as_deref());
        } else if def.types.is_empty() {
            insert_rule(&mut self.groups[0], rule.clone(), def.before.as_deref());
        } else {
            for ty in &def.types {
                let index = match self.groups.iter().position(|g| g.ty == Some(*ty)) {
                    Some(index) => index,
                    None => {
                        self.groups.push(RuleGroup::new(Some(*ty)));
                        self.groups.len() - 1
                    }
                };
                insert_rule(&mut self.groups[index], rule.clone(), def.before.as_deref());
            }
        }
        self.keywords.insert(keyword.clone());
        self.all.insert(keyword, rule);
        for implemented in &def.implements {
            if !self.keywords.contains(implemented) {
                self.add_known(implemented)?;
            }
        }
        Ok(())
    }

    /// Forget a keyword entirely
    pub fn remove(&mut self, keyword: &str) {
        self.keywords.remove(keyword);
        self.all.remove(keyword);
        for group in self.groups.iter_mut().chain(std::iter::once(&mut self.post)) {
            group.rules.retain(|rule| rule.keyword != keyword);
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&Arc<KeywordDefinition>> {
        self.all.get(keyword).map(|rule| &rule.def)
    }

    pub fn is_known(&self, keyword: &str) -> bool {
        self.keywords.contains(keyword)
    }

    /// Whether the keyword has a definition
    pub fn has_rule(&self, keyword: &str) -> bool {
        self.all.contains_key(keyword)
    }

    pub fn rule(&self, keyword: &str) -> Option<&Rule> {
        self.all.get(keyword)
    }

    pub fn all(&self) -> impl Iterator<Item = &Rule> {
        self.all.values()
    }

    /// Groups in execution order, without `post`
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn post(&self) -> &RuleGroup {
        &self.post
    }

    pub fn group(&self, ty: JsonType) -> Option<&RuleGroup> {
        self.groups.iter().find(|g| g.ty == Some(ty))
    }
}

fn insert_rule(group: &mut RuleGroup, rule: Rule, before: Option<&str>) {
    match before.and_then(|b| group.rules.iter().position(|r| r.keyword == b)) {
        Some(index) => group.rules.insert(index, rule),
        None => {
            if let Some(before) = before {
                log::warn!("rule {} is not defined", before);
            }
            group.rules.push(rule)
        }
    }
}

fn check_keyword_name(keyword: &str) -> Result<()> {
    let mut chars = keyword.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | ':' | '-'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::keyword(keyword, format!("Keyword {} has invalid name", keyword)))
    }
}
