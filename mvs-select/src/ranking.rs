use crate::{Error, ScoreTable};
use float_ord::FloatOrd;
use itertools::Itertools;
use mvs_reconstruction::ImageId;
use std::cmp::Reverse;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The neighbors chosen for one reference view, best first.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSelection {
    pub reference: ImageId,
    pub neighbors: Vec<(ImageId, f64)>,
}

fn ranked(table: &ScoreTable, view: ImageId, k: usize) -> Result<Vec<(ImageId, f64)>, Error> {
    let scores = table.scores(view).ok_or(Error::UnknownImage(view))?;
    Ok(scores
        .sorted_by_key(|&(id, score)| (Reverse(FloatOrd(score)), id))
        .take(k)
        .collect())
}

/// The `k` best neighbors of `view` by descending score, breaking ties by ascending id.
///
/// The view itself is never included. Fewer than `k` views are returned if the table does
/// not have that many other views.
pub fn rank_neighbors(table: &ScoreTable, view: ImageId, k: usize) -> Result<Vec<ImageId>, Error> {
    Ok(ranked(table, view, k)?
        .into_iter()
        .map(|(id, _)| id)
        .collect())
}

/// Ranks the neighbors of every view in the table.
pub fn select_views(table: &ScoreTable, k: usize) -> Vec<ViewSelection> {
    table
        .views()
        .iter()
        .filter_map(|&reference| {
            ranked(table, reference, k)
                .ok()
                .map(|neighbors| ViewSelection {
                    reference,
                    neighbors,
                })
        })
        .collect_vec()
}
