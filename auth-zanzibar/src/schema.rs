use crate::{
    error::{Result, ZanzibarError},
    models::TupleKey,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// How a relation is computed from stored tuples.
///
/// Stored as single-key maps (in both YAML and JSON) so schema files read
/// naturally:
///
/// ```yaml
/// viewer:
///   rewrite:
///     union:
///       - direct
///       - computed: editor
///       - tuple_to_userset:
///           tupleset_relation: parent
///           computed_relation: viewer
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteRule {
    /// Tuples stored for this relation (`this`)
    Direct,
    /// Another relation on the same object
    Computed(String),
    /// Holds if any member holds
    Union(Vec<RewriteRule>),
    /// Holds only if every member holds
    Intersection(Vec<RewriteRule>),
    /// Follow `tupleset_relation` to related objects, then evaluate
    /// `computed_relation` on each of them
    TupleToUserset {
        tupleset_relation: String,
        computed_relation: String,
    },
}

impl RewriteRule {
    pub fn computed(relation: &str) -> Self {
        RewriteRule::Computed(relation.to_string())
    }

    /// Union of the named relations on the same object
    pub fn union_of(relations: &[&str]) -> Self {
        RewriteRule::Union(relations.iter().map(|r| Self::computed(r)).collect())
    }

    /// Direct tuples plus any of the named relations
    pub fn direct_or(relations: &[&str]) -> Self {
        let mut members = vec![RewriteRule::Direct];
        members.extend(relations.iter().map(|r| Self::computed(r)));
        RewriteRule::Union(members)
    }

    pub fn tuple_to_userset(tupleset_relation: &str, computed_relation: &str) -> Self {
        RewriteRule::TupleToUserset {
            tupleset_relation: tupleset_relation.to_string(),
            computed_relation: computed_relation.to_string(),
        }
    }

    /// Append a member, turning a non-union rule into a union
    pub fn or(self, other: RewriteRule) -> Self {
        match self {
            RewriteRule::Union(mut members) => {
                members.push(other);
                RewriteRule::Union(members)
            }
            rule => RewriteRule::Union(vec![rule, other]),
        }
    }

    /// Whether stored tuples can satisfy this rule.
    ///
    /// Only `Direct` reads tuples for the relation itself; a rule without a
    /// `Direct` member anywhere in its unions or intersections is purely
    /// derived.
    pub fn is_writable(&self) -> bool {
        match self {
            RewriteRule::Direct => true,
            RewriteRule::Union(members) | RewriteRule::Intersection(members) => {
                members.iter().any(RewriteRule::is_writable)
            }
            RewriteRule::Computed(_) | RewriteRule::TupleToUserset { .. } => false,
        }
    }

    /// Computed relations reached through `tupleset` tuples
    fn tupleset_targets<'a>(&'a self, tupleset: &str, out: &mut Vec<&'a str>) {
        match self {
            RewriteRule::Direct | RewriteRule::Computed(_) => {}
            RewriteRule::Union(members) | RewriteRule::Intersection(members) => {
                for member in members {
                    member.tupleset_targets(tupleset, out);
                }
            }
            RewriteRule::TupleToUserset {
                tupleset_relation,
                computed_relation,
            } => {
                if tupleset_relation == tupleset {
                    out.push(computed_relation);
                }
            }
        }
    }

    /// Relations of the owning namespace this rule refers to
    fn local_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            RewriteRule::Direct => {}
            RewriteRule::Computed(relation) => out.push(relation),
            RewriteRule::Union(members) | RewriteRule::Intersection(members) => {
                for member in members {
                    member.local_references(out);
                }
            }
            RewriteRule::TupleToUserset {
                tupleset_relation, ..
            } => out.push(tupleset_relation),
        }
    }
}

/// Definition of a relation within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub rewrite: RewriteRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelationDefinition {
    pub fn new(rewrite: RewriteRule, description: &str) -> Self {
        Self {
            rewrite,
            description: Some(description.to_string()),
        }
    }
}

/// Definition of a namespace (resource type)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDefinition>,
}

impl NamespaceDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, name: &str, rewrite: RewriteRule, description: &str) -> Self {
        self.relations
            .insert(name.to_string(), RelationDefinition::new(rewrite, description));
        self
    }

    /// Relations a related object must define when linked through `tupleset`
    pub fn tupleset_targets(&self, tupleset: &str) -> Vec<&str> {
        let mut targets = Vec::new();
        for definition in self.relations.values() {
            definition.rewrite.tupleset_targets(tupleset, &mut targets);
        }
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}

/// Static registry of namespace rewrite rules.
///
/// Loaded once at startup and shared read-only; rule lookups never touch
/// the tuple store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRegistry {
    pub namespaces: HashMap<String, NamespaceDefinition>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, name: &str, definition: NamespaceDefinition) -> Self {
        self.namespaces.insert(name.to_string(), definition);
        self
    }

    /// Built-in schema for the workspace/project/document hierarchy
    pub fn freeflow_default() -> Self {
        // Inherited permissions shared by folders and documents
        let inherited = |relation: &str, local: &[&str]| {
            RewriteRule::direct_or(local).or(RewriteRule::tuple_to_userset("parent", relation))
        };

        Self::new()
            .with_namespace("user", NamespaceDefinition::new())
            .with_namespace(
                "team",
                NamespaceDefinition::new()
                    .relation("admin", RewriteRule::Direct, "Team administrator")
                    .relation("member", RewriteRule::direct_or(&["admin"]), "Team member")
                    .relation("can_delete", RewriteRule::union_of(&["admin"]), "May manage team grants"),
            )
            .with_namespace(
                "project",
                NamespaceDefinition::new()
                    .relation("owner", RewriteRule::Direct, "Project owner")
                    .relation("editor", RewriteRule::direct_or(&["owner"]), "Can edit project content")
                    .relation("viewer", RewriteRule::direct_or(&["editor"]), "Can view project content")
                    .relation("can_delete", RewriteRule::union_of(&["owner"]), "May delete and share"),
            )
            .with_namespace(
                "folder",
                NamespaceDefinition::new()
                    .relation("parent", RewriteRule::Direct, "Containing project or folder")
                    .relation("owner", RewriteRule::Direct, "Folder owner")
                    .relation("editor", inherited("editor", &["owner"]), "Can edit folder content")
                    .relation("viewer", inherited("viewer", &["editor"]), "Can view folder content")
                    .relation("can_delete", RewriteRule::union_of(&["owner"])
                        .or(RewriteRule::tuple_to_userset("parent", "can_delete")), "May delete and share"),
            )
            .with_namespace(
                "document",
                NamespaceDefinition::new()
                    .relation("parent", RewriteRule::Direct, "Containing folder or project")
                    .relation("owner", RewriteRule::Direct, "Document owner")
                    .relation("editor", inherited("editor", &["owner"]), "Can edit document")
                    .relation("viewer", inherited("viewer", &["editor"]), "Can view document")
                    .relation("can_delete", RewriteRule::union_of(&["owner"])
                        .or(RewriteRule::tuple_to_userset("parent", "can_delete")), "May delete and share"),
            )
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(source)
            .map_err(|e| ZanzibarError::InvalidSchema(format!("Failed to parse YAML schema: {}", e)))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(source)
            .map_err(|e| ZanzibarError::InvalidSchema(format!("Failed to parse JSON schema: {}", e)))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load a schema file; `.json` is parsed as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ZanzibarError::InvalidSchema(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    /// Validate that every local reference resolves.
    ///
    /// Cyclic rules are legal; the expansion engine terminates on them.
    pub fn validate(&self) -> Result<()> {
        for (namespace, definition) in &self.namespaces {
            if namespace.is_empty() {
                return Err(ZanzibarError::InvalidSchema("Empty namespace name".to_string()));
            }

            for (relation, relation_def) in &definition.relations {
                if relation.is_empty() {
                    return Err(ZanzibarError::InvalidSchema(format!(
                        "Empty relation name in namespace '{}'",
                        namespace
                    )));
                }

                let mut references = Vec::new();
                relation_def.rewrite.local_references(&mut references);
                for reference in references {
                    if !definition.relations.contains_key(reference) {
                        return Err(ZanzibarError::InvalidSchema(format!(
                            "Relation '{}#{}' refers to unknown relation '{}'",
                            namespace, relation, reference
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rewrite rule for a (namespace, relation) pair
    pub fn get_relation_rule(&self, namespace: &str, relation: &str) -> Result<&RewriteRule> {
        let definition = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| ZanzibarError::UnknownNamespace(namespace.to_string()))?;

        definition
            .relations
            .get(relation)
            .map(|r| &r.rewrite)
            .ok_or_else(|| ZanzibarError::UnknownRelation {
                namespace: namespace.to_string(),
                relation: relation.to_string(),
            })
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn has_relation(&self, namespace: &str, relation: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|ns| ns.relations.contains_key(relation))
    }

    /// Validate that a tuple conforms to the schema
    pub fn validate_tuple(&self, key: &TupleKey) -> Result<()> {
        let definition = self
            .namespaces
            .get(&key.namespace)
            .ok_or_else(|| ZanzibarError::Validation(format!("Unknown namespace '{}'", key.namespace)))?;
        let relation = definition.relations.get(&key.relation).ok_or_else(|| {
            ZanzibarError::Validation(format!(
                "Unknown relation '{}' for namespace '{}'",
                key.relation, key.namespace
            ))
        })?;

        if !relation.rewrite.is_writable() {
            return Err(ZanzibarError::Validation(format!(
                "Relation '{}#{}' is computed and cannot be written directly",
                key.namespace, key.relation
            )));
        }

        for target in definition.tupleset_targets(&key.relation) {
            if !self.has_relation(&key.subject_namespace, target) {
                return Err(ZanzibarError::Validation(format!(
                    "Relation '{}#{}' must point at an object defining '{}'; '{}' does not",
                    key.namespace, key.relation, target, key.subject_namespace
                )));
            }
        }

        if let Some(ref subject_relation) = key.subject_relation {
            if !self.has_relation(&key.subject_namespace, subject_relation) {
                return Err(ZanzibarError::Validation(format!(
                    "Userset subject refers to unknown relation '{}#{}'",
                    key.subject_namespace, subject_relation
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectRef, Subject};

    #[test]
    fn test_freeflow_schema() {
        let registry = NamespaceRegistry::freeflow_default();
        assert!(registry.has_namespace("document"));
        assert!(registry.has_relation("project", "can_delete"));
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_get_relation_rule_errors() {
        let registry = NamespaceRegistry::freeflow_default();

        assert!(matches!(
            registry.get_relation_rule("spaceship", "owner"),
            Err(ZanzibarError::UnknownNamespace(ns)) if ns == "spaceship"
        ));
        assert!(matches!(
            registry.get_relation_rule("document", "pilot"),
            Err(ZanzibarError::UnknownRelation { relation, .. }) if relation == "pilot"
        ));
        assert_eq!(
            registry.get_relation_rule("project", "owner").unwrap(),
            &RewriteRule::Direct
        );
    }

    #[test]
    fn test_validate_rejects_dangling_reference() {
        let registry = NamespaceRegistry::new().with_namespace(
            "doc",
            NamespaceDefinition::new().relation("viewer", RewriteRule::union_of(&["editor"]), ""),
        );
        assert!(matches!(
            registry.validate(),
            Err(ZanzibarError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_validate_accepts_self_reference() {
        let registry = NamespaceRegistry::new().with_namespace(
            "doc",
            NamespaceDefinition::new().relation("loop", RewriteRule::union_of(&["loop"]), ""),
        );
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_yaml_schema() {
        let yaml = r#"
namespaces:
  user: {}
  project:
    relations:
      owner:
        rewrite: direct
      viewer:
        rewrite:
          union:
            - direct
            - computed: owner
  document:
    relations:
      parent:
        rewrite: direct
      viewer:
        description: Inherits from the parent project
        rewrite:
          tuple_to_userset:
            tupleset_relation: parent
            computed_relation: viewer
"#;
        let registry = NamespaceRegistry::from_yaml_str(yaml).unwrap();
        assert_eq!(
            registry.get_relation_rule("document", "viewer").unwrap(),
            &RewriteRule::tuple_to_userset("parent", "viewer")
        );
        assert_eq!(
            registry.get_relation_rule("project", "viewer").unwrap(),
            &RewriteRule::direct_or(&["owner"])
        );
    }

    #[test]
    fn test_json_schema() {
        let json = r#"{
            "namespaces": {
                "doc": {
                    "relations": {
                        "owner": { "rewrite": "direct" },
                        "editor": { "rewrite": { "intersection": [ { "computed": "owner" }, "direct" ] } }
                    }
                }
            }
        }"#;
        let registry = NamespaceRegistry::from_json_str(json).unwrap();
        assert_eq!(
            registry.get_relation_rule("doc", "editor").unwrap(),
            &RewriteRule::Intersection(vec![RewriteRule::computed("owner"), RewriteRule::Direct])
        );
    }

    #[test]
    fn test_validate_tuple() {
        let registry = NamespaceRegistry::freeflow_default();

        let key = TupleKey::new("document", "doc1", "owner", &Subject::user("alice"));
        assert!(registry.validate_tuple(&key).is_ok());

        let key = TupleKey::new("document", "doc1", "invalid_relation", &Subject::user("alice"));
        assert!(matches!(registry.validate_tuple(&key), Err(ZanzibarError::Validation(_))));

        let team = ObjectRef::new("team", "t1");
        let key = TupleKey::userset("project", "p1", "editor", &team, "member");
        assert!(registry.validate_tuple(&key).is_ok());

        let key = TupleKey::userset("project", "p1", "editor", &team, "captain");
        assert!(matches!(registry.validate_tuple(&key), Err(ZanzibarError::Validation(_))));
    }

    #[test]
    fn test_derived_relations_are_not_writable() {
        let registry = NamespaceRegistry::freeflow_default();

        assert!(RewriteRule::Direct.is_writable());
        assert!(RewriteRule::direct_or(&["owner"]).is_writable());
        assert!(!RewriteRule::union_of(&["owner"]).is_writable());
        assert!(!RewriteRule::tuple_to_userset("parent", "viewer").is_writable());

        for namespace in ["team", "project", "folder", "document"] {
            let key = TupleKey::new(namespace, "x1", "can_delete", &Subject::user("bob"));
            match registry.validate_tuple(&key) {
                Err(ZanzibarError::Validation(message)) => {
                    assert!(message.contains("cannot be written directly"), "{}", message)
                }
                other => panic!("expected validation error for {}, got {:?}", namespace, other),
            }
        }
    }

    #[test]
    fn test_parent_must_define_inherited_relations() {
        let registry = NamespaceRegistry::freeflow_default();
        let document = &registry.namespaces["document"];
        assert_eq!(document.tupleset_targets("parent"), vec!["can_delete", "editor", "viewer"]);
        assert!(document.tupleset_targets("owner").is_empty());

        let key = TupleKey::new("document", "d1", "parent", &Subject::new("folder", "f1"));
        assert!(registry.validate_tuple(&key).is_ok());

        let key = TupleKey::new("document", "d1", "parent", &Subject::user("mallory"));
        assert!(matches!(registry.validate_tuple(&key), Err(ZanzibarError::Validation(_))));

        let key = TupleKey::new("document", "d1", "parent", &Subject::new("team", "design"));
        assert!(matches!(registry.validate_tuple(&key), Err(ZanzibarError::Validation(_))));
    }
}
