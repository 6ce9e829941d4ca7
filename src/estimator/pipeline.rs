//! Pipelines as an explicit expression tree
//!
//! A [`PipelineNode`] is a tree of transforms: `Sequence` feeds each child's
//! output into the next, `Union` runs every branch on the same input and
//! column-joins the results. [`Pipeline`] interprets the tree and hands the
//! final frame to a head estimator.

use super::{Estimator, EstimatorKind};
use crate::ensemble::{GroupSpec, GroupedAverage};
use crate::error::{Result, StackError};
use crate::frame::{Column, FeatureFrame, LabelMatrix, LabelSchema};
use crate::text::{Analyzer, TfidfConfig, TfidfVectorizer};

/// A fittable frame-to-frame step
pub trait Transform: Send {
    fn fit(&mut self, _frame: &FeatureFrame, _labels: &LabelMatrix) -> Result<()> {
        Ok(())
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame>;

    fn describe(&self) -> String;
}

/// Transform expression tree
pub enum PipelineNode {
    Step(Box<dyn Transform>),
    Sequence(Vec<PipelineNode>),
    /// Branch outputs must not share column names
    Union(Vec<PipelineNode>),
}

impl PipelineNode {
    pub fn step<T: Transform + 'static>(transform: T) -> Self {
        PipelineNode::Step(Box::new(transform))
    }

    pub fn sequence(nodes: Vec<PipelineNode>) -> Self {
        PipelineNode::Sequence(nodes)
    }

    pub fn union(nodes: Vec<PipelineNode>) -> Self {
        PipelineNode::Union(nodes)
    }

    /// Fit every step on its own input and return the transformed frame
    pub fn fit_transform(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<FeatureFrame> {
        match self {
            PipelineNode::Step(t) => {
                t.fit(frame, labels)?;
                t.transform(frame)
            }
            PipelineNode::Sequence(nodes) => {
                let mut current = frame.clone();
                for node in nodes.iter_mut() {
                    current = node.fit_transform(&current, labels)?;
                }
                Ok(current)
            }
            PipelineNode::Union(nodes) => {
                let mut out = FeatureFrame::new(frame.row_ids().to_vec());
                for node in nodes.iter_mut() {
                    out.join_disjoint(&node.fit_transform(frame, labels)?)?;
                }
                Ok(out)
            }
        }
    }

    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        match self {
            PipelineNode::Step(t) => t.transform(frame),
            PipelineNode::Sequence(nodes) => {
                let mut current = frame.clone();
                for node in nodes {
                    current = node.transform(&current)?;
                }
                Ok(current)
            }
            PipelineNode::Union(nodes) => {
                let mut out = FeatureFrame::new(frame.row_ids().to_vec());
                for node in nodes {
                    out.join_disjoint(&node.transform(frame)?)?;
                }
                Ok(out)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PipelineNode::Step(t) => t.describe(),
            PipelineNode::Sequence(nodes) => {
                let parts: Vec<String> = nodes.iter().map(PipelineNode::describe).collect();
                format!("seq({})", parts.join(", "))
            }
            PipelineNode::Union(nodes) => {
                let parts: Vec<String> = nodes.iter().map(PipelineNode::describe).collect();
                format!("union({})", parts.join(", "))
            }
        }
    }
}

/// Transform tree followed by a head estimator
pub struct Pipeline {
    node: PipelineNode,
    head: Box<dyn Estimator>,
}

impl Pipeline {
    pub fn new<E: Estimator + 'static>(node: PipelineNode, head: E) -> Self {
        Self {
            node,
            head: Box::new(head),
        }
    }

    pub fn from_boxed(node: PipelineNode, head: Box<dyn Estimator>) -> Self {
        Self { node, head }
    }
}

impl Estimator for Pipeline {
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        let transformed = self.node.fit_transform(frame, labels)?;
        self.head.fit(&transformed, labels)
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        self.head.predict(&self.node.transform(frame)?)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Composite
    }

    fn reseed(&mut self, seed: u64) {
        self.head.reseed(seed);
    }

    fn describe(&self) -> String {
        format!("pipeline[{} -> {}]", self.node.describe(), self.head.describe())
    }
}

/// Vectorise one text column; the output holds only the vectorised columns
pub struct OnColumn {
    column: String,
    prefix: String,
    vectorizer: TfidfVectorizer,
}

impl OnColumn {
    pub fn tfidf<S: Into<String>>(column: S, config: TfidfConfig) -> Self {
        let column = column.into();
        let tag = match config.analyzer {
            Analyzer::Word => "w",
            Analyzer::Char => "c",
        };
        Self {
            prefix: format!("{}#{}", column, tag),
            column,
            vectorizer: TfidfVectorizer::new(config),
        }
    }

    /// Output columns are named `{prefix}{index}`
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Transform for OnColumn {
    fn fit(&mut self, frame: &FeatureFrame, _labels: &LabelMatrix) -> Result<()> {
        self.vectorizer.fit(frame.text(&self.column)?)
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let matrix = self.vectorizer.transform(frame.text(&self.column)?)?;
        let mut out = FeatureFrame::new(frame.row_ids().to_vec());
        for (j, col) in matrix.columns().into_iter().enumerate() {
            out.insert(format!("{}{}", self.prefix, j), Column::Numeric(col.to_vec()))?;
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("on_column({}, {})", self.column, self.vectorizer.describe())
    }
}

/// Remove the named columns; each must exist
pub struct DropColumns(pub Vec<String>);

impl DropColumns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl Transform for DropColumns {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        frame.drop_columns(&self.0)
    }

    fn describe(&self) -> String {
        format!("drop({})", self.0.join(","))
    }
}

/// Keep only the named columns, in this order
pub struct SelectColumns(pub Vec<String>);

impl SelectColumns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl Transform for SelectColumns {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        frame.select_columns(&self.0)
    }

    fn describe(&self) -> String {
        format!("select({})", self.0.join(","))
    }
}

/// [`GroupedAverage`] as a pipeline step
pub struct GroupAverage {
    inner: GroupedAverage,
    schema: Option<LabelSchema>,
}

impl GroupAverage {
    pub fn new(spec: GroupSpec) -> Self {
        Self {
            inner: GroupedAverage::new(spec),
            schema: None,
        }
    }
}

impl Transform for GroupAverage {
    fn fit(&mut self, _frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        self.inner.spec().validate()?;
        self.schema = Some(labels.schema().clone());
        Ok(())
    }

    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let schema = self.schema.as_ref().ok_or(StackError::NotFitted)?;
        self.inner.apply(frame, schema)
    }

    fn describe(&self) -> String {
        let groups: Vec<String> = self
            .inner
            .spec()
            .groups()
            .iter()
            .map(|(g, members)| format!("{}=[{}]", g, members.join(",")))
            .collect();
        format!("group_average({})", groups.join(";"))
    }
}

/// Logistic sigmoid applied to every numeric column
pub struct Expit;

impl Transform for Expit {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        map_numeric(frame, |v| 1.0 / (1.0 + (-v).exp()))
    }

    fn describe(&self) -> String {
        "expit".to_string()
    }
}

/// Replace missing (NaN) numeric values with a constant
pub struct FillMissing(pub f64);

impl Transform for FillMissing {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let fill = self.0;
        map_numeric(frame, move |v| if v.is_nan() { fill } else { v })
    }

    fn describe(&self) -> String {
        format!("fill_missing({})", self.0)
    }
}

fn map_numeric<F: Fn(f64) -> f64>(frame: &FeatureFrame, f: F) -> Result<FeatureFrame> {
    let mut out = FeatureFrame::new(frame.row_ids().to_vec());
    for (name, column) in frame.iter() {
        let mapped = match column {
            Column::Numeric(values) => Column::Numeric(values.iter().map(|&v| f(v)).collect()),
            Column::Text(_) => column.clone(),
        };
        out.insert(name, mapped)?;
    }
    Ok(out)
}
