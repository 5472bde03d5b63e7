//! フィルタ候補の抽出

use crate::types::{Facility, FilterOptions};
use std::collections::BTreeSet;

fn push(set: &mut BTreeSet<String>, value: &str) {
    if !value.is_empty() {
        set.insert(value.to_string());
    }
}

/// 施設一覧から各フィルタの重複なし・ソート済み候補を抽出
pub fn extract_filters(facilities: &[Facility]) -> FilterOptions {
    let mut regions = BTreeSet::new();
    let mut local_authorities = BTreeSet::new();
    let mut location_types = BTreeSet::new();
    let mut inspection_categories = BTreeSet::new();
    let mut ratings = BTreeSet::new();
    let mut service_groups = BTreeSet::new();

    for f in facilities {
        push(&mut regions, &f.address.region);
        push(&mut local_authorities, &f.address.local_authority);
        push(&mut location_types, &f.location_type);
        push(&mut inspection_categories, &f.inspection_category);
        push(&mut ratings, f.overall_rating.as_deref().unwrap_or_default());
        push(&mut service_groups, &f.service_group);
    }

    FilterOptions {
        regions: regions.into_iter().collect(),
        local_authorities: local_authorities.into_iter().collect(),
        location_types: location_types.into_iter().collect(),
        inspection_categories: inspection_categories.into_iter().collect(),
        ratings: ratings.into_iter().collect(),
        service_groups: service_groups.into_iter().collect(),
    }
}
