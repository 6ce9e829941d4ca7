//! Grouped averaging of prediction blocks

use super::{average_blocks, discover_models, model_block};
use crate::error::{Result, StackError};
use crate::frame::{prediction_column, Column, FeatureFrame, LabelSchema};
use serde::{Deserialize, Serialize};

/// Ordered `(group_name, member_models)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSpec {
    groups: Vec<(String, Vec<String>)>,
}

impl GroupSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group (builder style)
    pub fn group<S, I, M>(mut self, name: S, members: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.groups
            .push((name.into(), members.into_iter().map(Into::into).collect()));
        self
    }

    pub fn groups(&self) -> &[(String, Vec<String>)] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group names must be unique and every group needs at least one member
    pub fn validate(&self) -> Result<()> {
        for (i, (name, members)) in self.groups.iter().enumerate() {
            if members.is_empty() {
                return Err(StackError::InvalidParameter {
                    name: "group".to_string(),
                    value: name.clone(),
                    reason: "group has no members".to_string(),
                });
            }
            if self.groups[..i].iter().any(|(other, _)| other == name) {
                return Err(StackError::InvalidParameter {
                    name: "group".to_string(),
                    value: name.clone(),
                    reason: "duplicate group name".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Replaces each group's member blocks by their per-label mean.
///
/// Emits `{group}__{label}` columns and removes the member columns, so the
/// output holds exactly `groups x labels` prediction columns. Every
/// prediction block in the frame must belong to a group; other columns pass
/// through untouched.
#[derive(Debug, Clone)]
pub struct GroupedAverage {
    spec: GroupSpec,
}

impl GroupedAverage {
    pub fn new(spec: GroupSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    pub fn apply(&self, frame: &FeatureFrame, schema: &LabelSchema) -> Result<FeatureFrame> {
        self.spec.validate()?;
        if let Some(stray) = discover_models(frame, schema)
            .into_iter()
            .find(|model| !self.spec.groups().iter().any(|(_, members)| members.contains(model)))
        {
            return Err(StackError::InvalidParameter {
                name: "groups".to_string(),
                value: stray,
                reason: "prediction block belongs to no group".to_string(),
            });
        }

        let mut averaged = Vec::with_capacity(self.spec.len());
        let mut consumed: Vec<String> = Vec::new();
        for (group, members) in self.spec.groups() {
            let blocks = members
                .iter()
                .map(|m| model_block(frame, m, schema))
                .collect::<Result<Vec<_>>>()?;
            averaged.push((group.clone(), average_blocks(&blocks)?));
            for member in members {
                for label in schema.names() {
                    let column = prediction_column(member, label);
                    if !consumed.contains(&column) {
                        consumed.push(column);
                    }
                }
            }
        }

        let mut out = frame.drop_columns(&consumed)?;
        for (group, block) in averaged {
            for (j, label) in schema.names().iter().enumerate() {
                out.insert(
                    prediction_column(&group, label),
                    Column::Numeric(block.column(j).to_vec()),
                )?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        let mut f = FeatureFrame::with_row_count(2);
        for (model, base) in [("gru", 0.1), ("lstm", 0.3), ("lr", 0.5), ("nb", 0.7), ("gbt", 0.9)] {
            for label in ["toxic", "insult"] {
                f.insert(prediction_column(model, label), Column::Numeric(vec![base, base]))
                    .unwrap();
            }
        }
        f.insert("num_words", Column::Numeric(vec![4.0, 9.0])).unwrap();
        f
    }

    #[test]
    fn test_grouped_shape() {
        let schema = LabelSchema::new(["toxic", "insult"]).unwrap();
        let spec = GroupSpec::new()
            .group("rnn", ["gru", "lstm"])
            .group("linear", ["lr", "nb"])
            .group("trees", ["gbt"]);
        let out = GroupedAverage::new(spec).apply(&frame(), &schema).unwrap();

        let prediction_columns = out
            .column_names()
            .iter()
            .filter(|n| n.contains("__"))
            .count();
        assert_eq!(prediction_columns, 3 * 2);
        assert!(out.contains("num_words"));
        assert!(!out.contains("gru__toxic"));
        assert!((out.numeric("rnn__toxic").unwrap()[0] - 0.2).abs() < 1e-12);
        assert!((out.numeric("trees__insult").unwrap()[1] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_ungrouped_block_rejected() {
        let schema = LabelSchema::new(["toxic", "insult"]).unwrap();
        let spec = GroupSpec::new()
            .group("rnn", ["gru", "lstm"])
            .group("linear", ["lr", "nb"]);
        match GroupedAverage::new(spec).apply(&frame(), &schema) {
            Err(StackError::InvalidParameter { value, .. }) => assert_eq!(value, "gbt"),
            other => panic!("expected an ungrouped block error, got {:?}", other.map(|f| f.column_names().to_vec())),
        }
    }

    #[test]
    fn test_unknown_member() {
        let schema = LabelSchema::new(["toxic", "insult"]).unwrap();
        let spec = GroupSpec::new()
            .group("rnn", ["gru", "capsule"])
            .group("rest", ["lstm", "lr", "nb", "gbt"]);
        assert!(matches!(
            GroupedAverage::new(spec).apply(&frame(), &schema),
            Err(StackError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let spec = GroupSpec::new().group("a", ["gru"]).group("a", ["lr"]);
        assert!(spec.validate().is_err());
    }
}
