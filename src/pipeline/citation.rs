/// 本文中のインライン引用マーカーの抽出。
///
/// `[[cite:<数字>]]` 形式のマーカーから被引用記事IDの集合を導出します。
/// 自己参照や実在しないIDの除外は照合エンジン側の責務です。
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static CITATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[cite:(\d+)\]\]").expect("valid regex"));

/// 本文から引用先の記事ID集合を抽出する（重複除去済み）。
#[must_use]
pub fn extract_citations(content: &str) -> BTreeSet<i64> {
    CITATION_MARKER
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()))
        .collect()
}
