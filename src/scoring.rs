// Relevance scoring for general search results
//
// Ranks candidates by how likely they are to be label-published uploads
// rather than covers, lyric videos or fan re-uploads. The hint lists are
// hand-tuned; the ordering they produce must be deterministic so the UI
// shows the same ranking for the same search every time.

const OFFICIAL_HINTS: [&str; 4] = ["official", "official video", "official audio", "music video"];

const STRONG_OFFICIAL_HINTS: [&str; 2] = ["official video", "official audio"];

const OFFICIAL_CHANNEL_HINTS: [&str; 12] = [
    "vevo",
    " - topic",
    "warner",
    "umg",
    "sony music",
    "rhino",
    "atlantic records",
    "universal music",
    "bmg",
    "columbia records",
    "emi",
    "virgin records",
];

const STRONG_CHANNEL_HINTS: [&str; 2] = ["vevo", " - topic"];

const NEGATIVE_HINTS: [&str; 13] = [
    "cover",
    "live",
    "lyrics",
    "letra",
    "remix",
    "tribute",
    "fan made",
    "parody",
    "official audio",
    "art track",
    "visualizer",
    "audio only",
    "static image",
];

/// Score a search result for "officialness". Pure, never fails; empty
/// strings behave as missing inputs. Hints accumulate independently.
pub fn official_score(title: &str, channel: &str) -> i32 {
    let t = title.to_lowercase();
    let c = channel.to_lowercase();
    let mut score = 0;

    for hint in OFFICIAL_HINTS {
        if t.contains(hint) {
            score += if STRONG_OFFICIAL_HINTS.contains(&hint) { 3 } else { 2 };
        }
    }
    for hint in OFFICIAL_CHANNEL_HINTS {
        if c.contains(hint) {
            score += if STRONG_CHANNEL_HINTS.contains(&hint) { 3 } else { 1 };
        }
    }
    for hint in NEGATIVE_HINTS {
        if t.contains(hint) {
            score -= 2;
        }
    }
    score
}

/// One general-search result before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub title: String,
    pub channel: String,
    pub duration_seconds: Option<u64>,
    pub url: String,
    /// Generated `ytsearch1:` expression used when the row is enqueued;
    /// doubles as the deterministic ranking tiebreaker
    pub query_expr: String,
    pub view_count: u64,
}

impl SearchCandidate {
    /// Build the enqueue expression the queue runner understands.
    pub fn query_expr_for(title: &str, channel: &str) -> String {
        format!("ytsearch1:{} {}", title, channel)
    }
}

/// A candidate with its computed score attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: SearchCandidate,
    pub score: i32,
}

/// Rank a batch of candidates by `(score, query_expr)` descending.
///
/// The secondary key keeps ties stable and reproducible regardless of the
/// order the search backend returned the rows in.
pub fn rank_candidates(candidates: Vec<SearchCandidate>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = official_score(&candidate.title, &candidate.channel);
            RankedCandidate { candidate, score }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.candidate.query_expr.cmp(&a.candidate.query_expr))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, channel: &str) -> SearchCandidate {
        SearchCandidate {
            title: title.to_string(),
            channel: channel.to_string(),
            duration_seconds: Some(200),
            url: format!("https://example/{}", title.replace(' ', "-")),
            query_expr: SearchCandidate::query_expr_for(title, channel),
            view_count: 1000,
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = official_score("Artist - Song (Official Video)", "ArtistVEVO");
        let b = official_score("Artist - Song (Official Video)", "ArtistVEVO");
        assert_eq!(a, b);
    }

    #[test]
    fn official_video_with_remix_nets_one() {
        // "official video" matches both itself (+3) and "official" (+2),
        // so isolate the two contributions the property cares about:
        // the strong positive hint and one negative hint.
        let with_remix = official_score("song official video remix", "");
        let without_remix = official_score("song official video", "");
        assert_eq!(without_remix - with_remix, 2);
        assert_eq!(
            official_score("official video", "") - official_score("", ""),
            5
        );
    }

    #[test]
    fn hints_accumulate_independently() {
        let one = official_score("song official", "");
        let both = official_score("song official music video", "");
        assert!(both > one);

        let negatives = official_score("song cover live remix", "");
        assert_eq!(negatives, -6);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(official_score("", ""), 0);
    }

    #[test]
    fn channel_hints_apply() {
        assert_eq!(official_score("song", "Artist - Topic"), 3);
        assert_eq!(official_score("song", "Columbia Records"), 1);
    }

    #[test]
    fn ranking_is_stable_under_permutation() {
        let items = vec![
            candidate("Song (Official Video)", "ArtistVEVO"),
            candidate("Song cover", "Random Guy"),
            candidate("Song live at venue", "Bootlegs"),
            candidate("Song (Official Audio)", "Artist - Topic"),
            candidate("Song", "Artist"),
        ];
        let mut shuffled = items.clone();
        shuffled.reverse();
        shuffled.swap(0, 2);

        let a = rank_candidates(items);
        let b = rank_candidates(shuffled);
        assert_eq!(a, b);
        // best-scored row first
        assert_eq!(a[0].candidate.title, "Song (Official Video)");
    }
}
