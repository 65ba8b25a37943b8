use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoroughRank {
    pub borough_key: i32,
    pub borough_name: String,
    pub min_precinct_code: i32,
}

/// Ranks boroughs by their lowest precinct code; the borough owning precinct 1 gets key 1.
///
/// Ties on the minimum fall back to the borough name. Blank names are ignored.
pub fn rank_boroughs<I, S>(pairs: I) -> Vec<BoroughRank>
where
    I: IntoIterator<Item = (i32, S)>,
    S: AsRef<str>,
{
    let mut minimums: BTreeMap<String, i32> = BTreeMap::new();
    for (precinct, borough) in pairs {
        let name = borough.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        minimums
            .entry(name.to_string())
            .and_modify(|m| *m = (*m).min(precinct))
            .or_insert(precinct);
    }

    let mut ranked: Vec<(i32, String)> = minimums.into_iter().map(|(n, m)| (m, n)).collect();
    ranked.sort();
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (min_precinct_code, borough_name))| BoroughRank {
            borough_key: idx as i32 + 1,
            borough_name,
            min_precinct_code,
        })
        .collect()
}
