//! 轨迹缓冲区
//!
//! 按时间排列的行，每行一组与列标签一一对应的数值。
//! 列组变换按行并行（rayon），行之间没有共享可变状态。

use rayon::prelude::*;

use crate::error::{EngineError, Result};

/// 单行：时间 + 数值
#[derive(Clone, Debug, PartialEq)]
pub struct StateRow {
    pub time: f64,
    pub values: Vec<f64>,
}

/// 内存中的轨迹表
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Storage {
    labels: Vec<String>,
    rows: Vec<StateRow>,
}

impl Storage {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// 追加一行；长度必须等于列数
    pub fn append(&mut self, time: f64, values: Vec<f64>) -> Result<()> {
        if values.len() != self.labels.len() {
            return Err(EngineError::dimension_mismatch("storage row", self.labels.len(), values.len()));
        }
        self.rows.push(StateRow { time, values });
        Ok(())
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn rows(&self) -> &[StateRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    fn require(&self, label: &str) -> Result<usize> {
        self.column_index(label)
            .ok_or_else(|| EngineError::UnknownColumn(label.to_string()))
    }

    /// 整列数据
    pub fn column(&self, label: &str) -> Result<Vec<f64>> {
        let index = self.require(label)?;
        Ok(self.rows.iter().map(|row| row.values[index]).collect())
    }

    /// 就地变换若干列（列数不变），重复列名只变换一次
    pub fn map_columns<F>(&mut self, labels: &[&str], f: F) -> Result<()>
    where
        F: Fn(f64) -> f64 + Sync,
    {
        let mut indices = labels
            .iter()
            .map(|label| self.require(label))
            .collect::<Result<Vec<_>>>()?;
        indices.sort_unstable();
        indices.dedup();
        self.rows.par_iter_mut().for_each(|row| {
            for &i in &indices {
                row.values[i] = f(row.values[i]);
            }
        });
        Ok(())
    }

    /// 用 `f(旧列组) -> 新列组` 替换一组列
    ///
    /// 旧列被删除，新列插入到旧列组中最靠前的位置。所有列名先校验，再修改。
    pub fn transform_column_group<F>(&mut self, from: &[&str], to: &[&str], f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> Vec<f64> + Sync,
    {
        let indices = from
            .iter()
            .map(|label| self.require(label))
            .collect::<Result<Vec<_>>>()?;
        let Some(&insert_at) = indices.iter().min() else {
            return Ok(());
        };
        // 删除后插入位置之前的列不受影响
        let mut removed = indices.clone();
        removed.sort_unstable();
        removed.dedup();

        let width = to.len();
        let results: Vec<Vec<f64>> = self
            .rows
            .par_iter()
            .map(|row| {
                let group: Vec<f64> = indices.iter().map(|&i| row.values[i]).collect();
                f(&group)
            })
            .collect();
        if let Some(bad) = results.iter().find(|r| r.len() != width) {
            return Err(EngineError::dimension_mismatch("column group", width, bad.len()));
        }

        self.rows.par_iter_mut().zip(results).for_each(|(row, new_values)| {
            for &i in removed.iter().rev() {
                row.values.remove(i);
            }
            row.values.splice(insert_at..insert_at, new_values);
        });

        for &i in removed.iter().rev() {
            self.labels.remove(i);
        }
        self.labels.splice(insert_at..insert_at, to.iter().map(|s| s.to_string()));
        Ok(())
    }
}
