//! CSV-backed dataset

use super::FeatureProvider;
use crate::cache::Split;
use crate::error::{Result, StackError};
use crate::frame::{Column, FeatureFrame, LabelMatrix, LabelSchema};
use ndarray::Array1;
use parking_lot::RwLock;
use polars::prelude::{CsvReadOptions, CsvWriter, DataFrame, DataType, SerReader, SerWriter};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Name of the example id column in every file
pub const ID_COLUMN: &str = "id";

/// A dataset directory:
///
/// - `train.csv`: `id`, the text column and one column per label
/// - `test.csv`: `id` and the text column
/// - `{tag}_train.csv` / `{tag}_test.csv`: feature set `tag`
///
/// Feature-set files are matched to examples through their `id` column when
/// they have one, and by row position otherwise. Feature sets are loaded on
/// first use and kept in memory.
pub struct CsvDataset {
    dir: PathBuf,
    text_column: String,
    train: FeatureFrame,
    test: FeatureFrame,
    labels: LabelMatrix,
    train_keys: Vec<String>,
    test_keys: Vec<String>,
    loaded: RwLock<HashMap<(String, Split), FeatureFrame>>,
}

impl std::fmt::Debug for CsvDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvDataset")
            .field("dir", &self.dir)
            .field("text_column", &self.text_column)
            .field("train_rows", &self.train.n_rows())
            .field("test_rows", &self.test.n_rows())
            .finish()
    }
}

impl CsvDataset {
    pub fn open<P: AsRef<Path>>(dir: P, text_column: &str, schema: LabelSchema) -> Result<Self> {
        let start = Instant::now();
        let dir = dir.as_ref().to_path_buf();

        let train_df = read_csv(&dir.join("train.csv"))?;
        let test_df = read_csv(&dir.join("test.csv"))?;

        let train_keys = text_values(&train_df, ID_COLUMN)?;
        let test_keys = text_values(&test_df, ID_COLUMN)?;

        // Internal ids: training rows first, test rows after them
        let n_train = train_keys.len();
        let train = FeatureFrame::new((0..n_train).collect())
            .with_text(text_column, text_values(&train_df, text_column)?)?;
        let test = FeatureFrame::new((n_train..n_train + test_keys.len()).collect())
            .with_text(text_column, text_values(&test_df, text_column)?)?;

        let columns = schema
            .names()
            .iter()
            .map(|label| {
                let values = numeric_values(&train_df, label)?;
                if let Some(row) = values.iter().position(|v| v.is_nan()) {
                    return Err(StackError::Data(format!("missing '{}' label in row {}", label, row)));
                }
                Ok(Array1::from(values))
            })
            .collect::<Result<Vec<_>>>()?;
        let labels = LabelMatrix::from_columns(schema, columns)?;

        info!(
            dir = %dir.display(),
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "dataset loaded"
        );

        Ok(Self {
            dir,
            text_column: text_column.to_string(),
            train,
            test,
            labels,
            train_keys,
            test_keys,
            loaded: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn text_column(&self) -> &str {
        &self.text_column
    }

    /// External ids of a split, in row order
    pub fn keys(&self, split: Split) -> &[String] {
        match split {
            Split::Train => &self.train_keys,
            Split::Test => &self.test_keys,
        }
    }

    fn base_frame(&self, split: Split) -> &FeatureFrame {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }

    fn feature_set(&self, tag: &str, split: Split) -> Result<FeatureFrame> {
        let cache_key = (tag.to_string(), split);
        if let Some(frame) = self.loaded.read().get(&cache_key) {
            return Ok(frame.clone());
        }

        let path = self.dir.join(format!("{}_{}.csv", tag, split));
        if !path.is_file() {
            return Err(StackError::FeatureNotFound(tag.to_string()));
        }
        let df = read_csv(&path)?;
        let frame = self.to_frame(&df, split)?;
        debug!(tag, split = %split, columns = frame.n_columns(), "feature set loaded");

        self.loaded.write().insert(cache_key, frame.clone());
        Ok(frame)
    }

    fn to_frame(&self, df: &DataFrame, split: Split) -> Result<FeatureFrame> {
        let base = self.base_frame(split);
        let row_ids = if df.get_column_names().iter().any(|n| n.as_str() == ID_COLUMN) {
            let positions: HashMap<&str, usize> = self
                .keys(split)
                .iter()
                .enumerate()
                .map(|(pos, key)| (key.as_str(), pos))
                .collect();
            text_values(df, ID_COLUMN)?
                .iter()
                .map(|key| {
                    positions
                        .get(key.as_str())
                        .map(|&pos| base.row_ids()[pos])
                        .ok_or_else(|| StackError::Data(format!("unknown {} id '{}'", split, key)))
                })
                .collect::<Result<Vec<_>>>()?
        } else if df.height() == base.n_rows() {
            base.row_ids().to_vec()
        } else {
            return Err(StackError::DimensionMismatch {
                expected: base.n_rows(),
                actual: df.height(),
            });
        };

        let mut frame = FeatureFrame::new(row_ids);
        for name in df.get_column_names() {
            let name = name.as_str();
            if name == ID_COLUMN {
                continue;
            }
            let column = if df.column(name)?.dtype() == &DataType::String {
                Column::Text(text_values(df, name)?)
            } else {
                Column::Numeric(numeric_values(df, name)?)
            };
            frame.insert(name, column)?;
        }
        frame.align_to(base.row_ids())
    }

    /// Write `predictions` for `split` as CSV: the id column, then one column
    /// per label
    pub fn write_predictions<P: AsRef<Path>>(&self, path: P, split: Split, predictions: &LabelMatrix) -> Result<()> {
        let keys = self.keys(split);
        if keys.len() != predictions.n_rows() {
            return Err(StackError::DimensionMismatch {
                expected: keys.len(),
                actual: predictions.n_rows(),
            });
        }
        let mut columns = vec![polars::prelude::Column::new(ID_COLUMN.into(), keys.to_vec())];
        for (j, label) in predictions.schema().names().iter().enumerate() {
            columns.push(polars::prelude::Column::new(
                label.as_str().into(),
                predictions.column(j).to_vec(),
            ));
        }
        let mut df = DataFrame::new(columns)?;
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        info!(path = %path.as_ref().display(), rows = df.height(), "predictions written");
        Ok(())
    }
}

impl FeatureProvider for CsvDataset {
    fn base(&self, split: Split) -> Result<FeatureFrame> {
        Ok(self.base_frame(split).clone())
    }

    fn columns(&self, tags: &[String], split: Split) -> Result<FeatureFrame> {
        let mut out = FeatureFrame::new(self.base_frame(split).row_ids().to_vec());
        for tag in tags {
            out.join(&self.feature_set(tag, split)?)?;
        }
        Ok(out)
    }

    fn labels(&self) -> &LabelMatrix {
        &self.labels
    }

    fn describe(&self) -> String {
        format!("csv({})", self.dir.display())
    }
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()?;
    Ok(df)
}

fn text_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_| StackError::FeatureNotFound(name.to_string()))?
        .cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Nulls become NaN
fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| StackError::FeatureNotFound(name.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}
