//! Group registry
//!
//! Every subscriber group sees events through its own output template. The
//! registry always contains the default group unless a caller overrides it.

use crate::error::GroupError;
use crate::event::LogEvent;
use crate::template::OutputTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Group every client and sink falls back to
pub const DEFAULT_GROUP_NAME: &str = "loggers";

pub const DEFAULT_OUTPUT_TEMPLATE: &str =
    "[{Timestamp:%m/%d/%y %H:%M:%S} {Level:u3}] {Message}{NewLine}{Exception}";

/// Replace a blank group name with [`DEFAULT_GROUP_NAME`]
pub fn normalize_group_name(name: &str) -> &str {
    if name.trim().is_empty() {
        DEFAULT_GROUP_NAME
    } else {
        name
    }
}

/// Raw form used in configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupTemplateSpec {
    #[serde(alias = "GroupName", alias = "name")]
    group_name: String,
    #[serde(default = "default_template_source", alias = "OutputTemplate", alias = "template")]
    output_template: String,
}

fn default_template_source() -> String {
    DEFAULT_OUTPUT_TEMPLATE.to_string()
}

/// A group name bound to a compiled output template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GroupTemplateSpec", into = "GroupTemplateSpec")]
pub struct GroupTemplate {
    group_name: String,
    template: OutputTemplate,
}

impl GroupTemplate {
    pub fn new(group_name: impl Into<String>, output_template: &str) -> Result<Self, GroupError> {
        let group_name = group_name.into();
        if group_name.trim().is_empty() {
            return Err(GroupError::EmptyName);
        }
        let template =
            OutputTemplate::parse(output_template).map_err(|source| GroupError::InvalidTemplate {
                group: group_name.clone(),
                source,
            })?;
        Ok(Self {
            group_name,
            template,
        })
    }

    /// The implicit `loggers` group with the default output template
    pub fn default_group() -> Self {
        Self {
            group_name: DEFAULT_GROUP_NAME.to_string(),
            template: OutputTemplate::default(),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn output_template(&self) -> &str {
        self.template.source()
    }

    pub fn render(&self, event: &LogEvent) -> String {
        self.template.render(event)
    }
}

impl TryFrom<GroupTemplateSpec> for GroupTemplate {
    type Error = GroupError;

    fn try_from(spec: GroupTemplateSpec) -> Result<Self, Self::Error> {
        GroupTemplate::new(spec.group_name, &spec.output_template)
    }
}

impl From<GroupTemplate> for GroupTemplateSpec {
    fn from(group: GroupTemplate) -> Self {
        GroupTemplateSpec {
            output_template: group.template.source().to_string(),
            group_name: group.group_name,
        }
    }
}

/// Ordered set of group templates with unique names
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSet {
    groups: Vec<GroupTemplate>,
}

impl GroupSet {
    /// Merge caller groups over the default group
    ///
    /// Caller groups keep their order and the default group is appended last
    /// unless a caller entry already uses its name. When the caller list
    /// repeats a name the first occurrence is kept.
    pub fn merge_with_default<I>(groups: I) -> Result<Self, GroupError>
    where
        I: IntoIterator<Item = GroupTemplate>,
    {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for group in groups {
            if group.group_name.trim().is_empty() {
                return Err(GroupError::EmptyName);
            }
            if seen.insert(group.group_name.clone()) {
                merged.push(group);
            }
        }

        if !seen.contains(DEFAULT_GROUP_NAME) {
            merged.push(GroupTemplate::default_group());
        }

        Ok(Self { groups: merged })
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupTemplate> {
        self.groups.iter()
    }

    pub fn get(&self, group_name: &str) -> Option<&GroupTemplate> {
        self.groups.iter().find(|g| g.group_name == group_name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.group_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Default for GroupSet {
    fn default() -> Self {
        Self {
            groups: vec![GroupTemplate::default_group()],
        }
    }
}

impl<'a> IntoIterator for &'a GroupSet {
    type Item = &'a GroupTemplate;
    type IntoIter = std::slice::Iter<'a, GroupTemplate>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}
