//! Programmatic chapter-quality detectors.
//!
//! These run over the ordered chapter texts of a novel and need no judge.
//! Every verdict carries its numbers in `details` so a reviewer can see
//! why it fired.

use quillgrade_core::{CheckResult, EvaluationMethod};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Tunable limits of the detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicThresholds {
    /// Clone detection needs this many chapters
    pub clone_min_chapters: usize,
    /// Characters compared for near clones
    pub near_clone_prefix_chars: usize,
    /// Consecutive near clones that fail
    pub near_clone_run: usize,
    /// Alternation detection needs this many chapters
    pub alternating_min_chapters: usize,
    /// Back half must hold this many chapters
    pub alternating_min_back_half: usize,
    /// A and B must differ by at least this ratio
    pub alternating_min_diff: f64,
    /// Allowed deviation from the expected phase size
    pub alternating_tolerance: f64,
    /// Full A-B rounds that fail
    pub alternating_rounds: usize,
    /// Minimum written / planned chapters
    pub completion_ratio: f64,
    /// Stability detection needs this many chapters
    pub stability_min_chapters: usize,
    /// Shortest acceptable late chapter, in characters
    pub stability_floor_chars: usize,
    /// Late mean / early mean below this fails
    pub collapse_ratio: f64,
    /// Paragraphs shorter than this are ignored
    pub paragraph_min_chars: usize,
    /// Paragraphs shared across chapters that fail
    pub cross_chapter_groups: usize,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            clone_min_chapters: 4,
            near_clone_prefix_chars: 500,
            near_clone_run: 3,
            alternating_min_chapters: 8,
            alternating_min_back_half: 6,
            alternating_min_diff: 0.03,
            alternating_tolerance: 0.05,
            alternating_rounds: 3,
            completion_ratio: 0.30,
            stability_min_chapters: 6,
            stability_floor_chars: 200,
            collapse_ratio: 0.25,
            paragraph_min_chars: 50,
            cross_chapter_groups: 5,
        }
    }
}

/// Detector selected by a rule's `validation_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicMethod {
    /// `chapter_cloning_detection`
    ChapterCloning,
    /// `alternating_repetition_detection`
    AlternatingRepetition,
    /// `chapter_completion_ratio`
    ChapterCompletion,
    /// `chapter_length_stability`
    LengthStability,
    /// `paragraph_repetition_detection`
    ParagraphRepetition,
}

impl HeuristicMethod {
    /// Map a validation method name.
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "chapter_cloning_detection" => Some(Self::ChapterCloning),
            "alternating_repetition_detection" => Some(Self::AlternatingRepetition),
            "chapter_completion_ratio" => Some(Self::ChapterCompletion),
            "chapter_length_stability" => Some(Self::LengthStability),
            "paragraph_repetition_detection" => Some(Self::ParagraphRepetition),
            _ => None,
        }
    }
}

/// One chapter file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// File name
    pub name: String,
    /// Raw text
    pub text: String,
}

impl Chapter {
    /// Create a chapter.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Text without the title line.
    fn body(&self) -> &str {
        self.text.split_once('\n').map_or("", |(_, body)| body)
    }
}

/// The five detectors.
#[derive(Debug, Clone, Default)]
pub struct ContentHeuristics {
    thresholds: HeuristicThresholds,
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn heuristic(result: CheckResult) -> CheckResult {
    result.with_method(EvaluationMethod::Heuristic)
}

/// Longest run of equal neighbours as `(start, length)`.
fn longest_run<T: PartialEq>(items: &[T]) -> (usize, usize) {
    let (mut best_start, mut best_len) = (0, usize::from(!items.is_empty()));
    let (mut start, mut len) = (0, 1);
    for i in 1..items.len() {
        if items[i] == items[i - 1] {
            len += 1;
            if len > best_len {
                best_start = start;
                best_len = len;
            }
        } else {
            start = i;
            len = 1;
        }
    }
    (best_start, best_len)
}

impl ContentHeuristics {
    /// Create detectors with custom thresholds.
    pub fn new(thresholds: HeuristicThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use.
    pub fn thresholds(&self) -> &HeuristicThresholds {
        &self.thresholds
    }

    /// Consecutive chapters with identical bodies, or identical openings.
    pub fn chapter_cloning(&self, chapters: &[Chapter]) -> CheckResult {
        let t = &self.thresholds;
        if chapters.len() < t.clone_min_chapters {
            return heuristic(CheckResult::skip(
                "too few chapters for clone detection",
                format!("{} chapters, need >= {}", chapters.len(), t.clone_min_chapters),
            ));
        }

        let full: Vec<String> = chapters.iter().map(|c| sha256_hex(c.body())).collect();
        let prefix: Vec<String> = chapters
            .iter()
            .map(|c| {
                let head: String = c.body().chars().take(t.near_clone_prefix_chars).collect();
                sha256_hex(&head)
            })
            .collect();

        let (start, run) = longest_run(&full);
        if run >= 2 {
            let end = start + run - 1;
            return heuristic(CheckResult::fail(
                format!("{run} consecutive chapters are full clones"),
                format!(
                    "{} to {} ({} chapters) are identical after the title line (sha256 {}...)",
                    chapters[start].name,
                    chapters[end].name,
                    run,
                    &full[start][..12]
                ),
            ));
        }

        let (start, run) = longest_run(&prefix);
        if run >= t.near_clone_run {
            let end = start + run - 1;
            return heuristic(CheckResult::fail(
                format!("{run} consecutive chapters are near clones"),
                format!(
                    "{} to {} ({} chapters) share the same first {} characters (sha256 {}...)",
                    chapters[start].name,
                    chapters[end].name,
                    run,
                    t.near_clone_prefix_chars,
                    &prefix[start][..12]
                ),
            ));
        }

        heuristic(CheckResult::pass(
            "no chapter clones",
            format!(
                "{} chapters; longest identical-body run {}, longest identical-opening run {}",
                chapters.len(),
                longest_run(&full).1,
                run
            ),
        ))
    }

    /// A-B-A-B size cycles in the back half of the book.
    pub fn alternating_repetition(&self, chapters: &[Chapter]) -> CheckResult {
        let t = &self.thresholds;
        if chapters.len() < t.alternating_min_chapters {
            return heuristic(CheckResult::skip(
                "too few chapters for alternation detection",
                format!("{} chapters, need >= {}", chapters.len(), t.alternating_min_chapters),
            ));
        }

        let sizes: Vec<usize> = chapters.iter().map(|c| c.text.len()).collect();
        let half = sizes.len() / 2;
        let back = &sizes[half..];
        if back.len() < t.alternating_min_back_half {
            return heuristic(CheckResult::pass(
                "back half too short for an alternation",
                format!("back half holds {} chapters", back.len()),
            ));
        }

        let (mut best_rounds, mut best_start) = (0, 0);
        for start in 0..=(back.len() - t.alternating_min_back_half) {
            let (a, b) = (back[start] as f64, back[start + 1] as f64);
            if a == 0.0 || b == 0.0 || (a - b).abs() / a.max(b) < t.alternating_min_diff {
                continue;
            }
            let mut count = 2;
            for (offset, &actual) in back[start + 2..].iter().enumerate() {
                let expected = if offset % 2 == 0 { a } else { b };
                if (actual as f64 - expected).abs() / expected <= t.alternating_tolerance {
                    count += 1;
                } else {
                    break;
                }
            }
            if count / 2 > best_rounds {
                best_rounds = count / 2;
                best_start = start;
            }
        }

        if best_rounds >= t.alternating_rounds {
            let first = half + best_start;
            let last = (first + best_rounds * 2 - 1).min(chapters.len() - 1);
            return heuristic(CheckResult::fail(
                format!("{best_rounds} rounds of alternating repetition"),
                format!(
                    "{} to {} alternate A({} bytes)-B({} bytes) for {} rounds",
                    chapters[first].name,
                    chapters[last].name,
                    sizes[first],
                    sizes[first + 1],
                    best_rounds
                ),
            ));
        }

        heuristic(CheckResult::pass(
            "no alternating repetition",
            format!(
                "{} chapters; longest A-B alternation {} rounds in the back half",
                chapters.len(),
                best_rounds
            ),
        ))
    }

    /// Written chapters against the outline's plan.
    pub fn chapter_completion(
        &self,
        written: usize,
        planned: Option<usize>,
        min_ratio: Option<f64>,
    ) -> CheckResult {
        let min_ratio = min_ratio.unwrap_or(self.thresholds.completion_ratio);

        if let Some(planned) = planned.filter(|p| *p > 0) {
            let ratio = written as f64 / planned as f64;
            let details = format!(
                "outline plans {planned} chapters, {written} written ({:.1}%, threshold {:.0}%)",
                ratio * 100.0,
                min_ratio * 100.0
            );
            return heuristic(if ratio < min_ratio {
                CheckResult::fail(format!("chapter completion too low ({:.0}%)", ratio * 100.0), details)
            } else {
                CheckResult::pass(format!("chapter completion ok ({:.0}%)", ratio * 100.0), details)
            });
        }

        heuristic(match written {
            0 => CheckResult::fail("no chapters written", "no chapter files and no plan in the outline"),
            1 => CheckResult::fail(
                "only 1 chapter written",
                "planned chapter count unknown; a single chapter is not a novel",
            ),
            n => CheckResult::pass(
                format!("{n} chapters written"),
                format!("planned chapter count unknown; {n} chapters written"),
            ),
        })
    }

    /// Late chapters collapsing in length.
    pub fn length_stability(&self, chapters: &[Chapter]) -> CheckResult {
        let t = &self.thresholds;
        let n = chapters.len();
        if n < t.stability_min_chapters {
            return heuristic(CheckResult::skip(
                "too few chapters for length stability",
                format!("{n} chapters, need >= {}", t.stability_min_chapters),
            ));
        }

        let chars: Vec<usize> = chapters.iter().map(|c| c.text.chars().count()).collect();
        let first_n = (n / 3).max(2);
        let last_n = (n / 4).max(2);
        let first_avg = chars[..first_n].iter().sum::<usize>() as f64 / first_n as f64;
        let last = &chars[n - last_n..];
        let last_avg = last.iter().sum::<usize>() as f64 / last_n as f64;
        let means = format!(
            "first {first_n} chapters average {first_avg:.0} chars, last {last_n} average {last_avg:.0}"
        );

        let (min_offset, &last_min) = last
            .iter()
            .enumerate()
            .min_by_key(|(i, c)| (**c, *i))
            .unwrap_or((0, &0));
        if last_min < t.stability_floor_chars {
            return heuristic(CheckResult::fail(
                format!("late chapter degenerated ({last_min} chars)"),
                format!("{} has only {last_min} chars; {means}", chapters[n - last_n + min_offset].name),
            ));
        }

        if first_avg > 0.0 {
            let ratio = last_avg / first_avg;
            if ratio < t.collapse_ratio {
                let listing = chapters[n - last_n..]
                    .iter()
                    .zip(last)
                    .map(|(c, count)| format!("{}={count}", c.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                return heuristic(CheckResult::fail(
                    format!("chapter length collapsed to {:.0}%", ratio * 100.0),
                    format!("{means} ({:.1}%); last chapters: {listing}", ratio * 100.0),
                ));
            }
            return heuristic(CheckResult::pass(
                "chapter length stable",
                format!("{means} (ratio {:.1}%)", ratio * 100.0),
            ));
        }

        heuristic(CheckResult::pass("chapter length stable", means))
    }

    /// Paragraphs repeated inside a chapter or across many chapters.
    pub fn paragraph_repetition(&self, chapters: &[Chapter]) -> CheckResult {
        let t = &self.thresholds;
        let mut intra: Vec<(&str, String)> = Vec::new();
        // hash -> (chapters it occurs in, occurrences, preview)
        let mut shared: HashMap<String, (Vec<usize>, usize, String)> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (idx, chapter) in chapters.iter().enumerate() {
            let mut seen = HashMap::new();
            for para in chapter.text.split("\n\n").map(str::trim) {
                if para.chars().count() < t.paragraph_min_chars {
                    continue;
                }
                let hash = sha256_hex(para);
                if seen.insert(hash.clone(), ()).is_some() {
                    intra.push((chapter.name.as_str(), preview(para, 80)));
                }
                let entry = shared.entry(hash.clone()).or_insert_with(|| {
                    order.push(hash);
                    (Vec::new(), 0, preview(para, 60))
                });
                if !entry.0.contains(&idx) {
                    entry.0.push(idx);
                }
                entry.1 += 1;
            }
        }

        if !intra.is_empty() {
            let examples = intra
                .iter()
                .take(3)
                .map(|(name, text)| format!("[{name}] \"{text}\""))
                .collect::<Vec<_>>()
                .join("; ");
            return heuristic(CheckResult::fail(
                format!("{} paragraphs repeated within a chapter", intra.len()),
                format!("examples: {examples}"),
            ));
        }

        let mut cross: Vec<&(Vec<usize>, usize, String)> = order
            .iter()
            .filter_map(|h| shared.get(h))
            .filter(|(chapters, _, _)| chapters.len() >= 2)
            .collect();
        if cross.len() >= t.cross_chapter_groups {
            cross.sort_by(|a, b| b.1.cmp(&a.1));
            let examples = cross
                .iter()
                .take(3)
                .map(|(chapters, _, text)| format!("\"{text}\" in {} chapters", chapters.len()))
                .collect::<Vec<_>>()
                .join("; ");
            return heuristic(CheckResult::fail(
                format!("{} paragraphs repeated across chapters", cross.len()),
                format!(
                    "{} distinct paragraphs occur verbatim in several chapters; examples: {examples}",
                    cross.len()
                ),
            ));
        }

        heuristic(CheckResult::pass(
            "paragraph repetition within limits",
            format!(
                "0 repeats within chapters, {} shared across chapters (fails at {})",
                cross.len(),
                t.cross_chapter_groups
            ),
        ))
    }
}

fn preview(text: &str, chars: usize) -> String {
    if text.chars().count() > chars {
        format!("{}...", text.chars().take(chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Planned chapter count from an outline document.
///
/// Tries chapter lists under well-known keys, then the `key_chapters` of
/// `act_one` to `act_four`, then a top-level list.
pub fn planned_chapter_count(outline: &Value) -> Option<usize> {
    match outline {
        Value::Array(items) => Some(items.len()).filter(|n| *n > 0),
        Value::Object(map) => {
            let listed = ["chapters", "outline", "chapter_outlines", "volume_structure"]
                .iter()
                .filter_map(|key| map.get(*key)?.as_array())
                .map(Vec::len)
                .find(|n| *n > 0);
            listed.or_else(|| {
                let acts: usize = ["act_one", "act_two", "act_three", "act_four"]
                    .iter()
                    .filter_map(|key| map.get(*key)?.get("key_chapters")?.as_array())
                    .map(Vec::len)
                    .sum();
                (acts > 0).then_some(acts)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillgrade_core::Verdict;
    use serde_json::json;

    fn chapters_of_sizes(sizes: &[usize]) -> Vec<Chapter> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| Chapter::new(format!("chapter_{:02}.md", i + 1), "x".repeat(*size)))
            .collect()
    }

    #[test]
    fn test_clone_detection_cites_both_chapters() {
        let body = "The rain fell on the mountain sect for the third night.\nNobody slept.";
        let chapters = vec![
            Chapter::new("chapter_1.md", "# One\nA beginning of something new."),
            Chapter::new("chapter_2.md", format!("# Two\n{body}")),
            Chapter::new("chapter_3.md", format!("# Three\n{body}")),
            Chapter::new("chapter_4.md", "# Four\nAn ending of sorts."),
        ];
        let result = ContentHeuristics::default().chapter_cloning(&chapters);
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("chapter_2.md"));
        assert!(result.details.contains("chapter_3.md"));
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::Heuristic));
    }

    #[test]
    fn test_near_clone_needs_three_in_a_row() {
        let opening = "o".repeat(500);
        let mk = |i: usize, tail: &str| Chapter::new(format!("c{i}.md"), format!("# {i}\n{opening}{tail}"));
        let two = vec![mk(1, "a"), mk(2, "b"), Chapter::new("c3.md", "# 3\nother"), Chapter::new("c4.md", "# 4\nmore")];
        assert_eq!(ContentHeuristics::default().chapter_cloning(&two).check_result, Verdict::Pass);

        let three = vec![mk(1, "a"), mk(2, "b"), mk(3, "c"), Chapter::new("c4.md", "# 4\nmore")];
        let result = ContentHeuristics::default().chapter_cloning(&three);
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.reason.contains("near clones"));
    }

    #[test]
    fn test_clone_detection_skips_short_books() {
        let result = ContentHeuristics::default().chapter_cloning(&chapters_of_sizes(&[10, 10, 10]));
        assert_eq!(result.check_result, Verdict::Skip);
    }

    #[test]
    fn test_alternating_repetition_detected() {
        let mut sizes = vec![1000; 8];
        sizes.extend([2000, 500, 2000, 500, 2000, 500]);
        let result = ContentHeuristics::default().alternating_repetition(&chapters_of_sizes(&sizes));
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.reason.starts_with("3 rounds"));
    }

    #[test]
    fn test_alternating_ignores_flat_sizes() {
        let result = ContentHeuristics::default().alternating_repetition(&chapters_of_sizes(&[1000; 12]));
        assert_eq!(result.check_result, Verdict::Pass);
        let result = ContentHeuristics::default().alternating_repetition(&chapters_of_sizes(&[1000; 7]));
        assert_eq!(result.check_result, Verdict::Skip);
    }

    #[test]
    fn test_completion_ratio() {
        let h = ContentHeuristics::default();
        assert_eq!(h.chapter_completion(3, Some(20), None).check_result, Verdict::Fail);
        assert_eq!(h.chapter_completion(10, Some(20), None).check_result, Verdict::Pass);
        assert_eq!(h.chapter_completion(10, Some(20), Some(0.6)).check_result, Verdict::Fail);
        assert_eq!(h.chapter_completion(1, None, None).check_result, Verdict::Fail);
        assert_eq!(h.chapter_completion(0, None, None).check_result, Verdict::Fail);
        assert_eq!(h.chapter_completion(2, None, None).check_result, Verdict::Pass);
    }

    #[test]
    fn test_planned_count_shapes() {
        assert_eq!(planned_chapter_count(&json!({"chapters": [1, 2, 3]})), Some(3));
        assert_eq!(planned_chapter_count(&json!({"chapters": [], "outline": [1, 2]})), Some(2));
        assert_eq!(
            planned_chapter_count(&json!({"act_one": {"key_chapters": [1, 2]}, "act_three": {"key_chapters": [5]}})),
            Some(3)
        );
        assert_eq!(planned_chapter_count(&json!([{"title": "a"}])), Some(1));
        assert_eq!(planned_chapter_count(&json!({"title": "x"})), None);
    }

    #[test]
    fn test_length_stability() {
        let h = ContentHeuristics::default();
        let degenerate = h.length_stability(&chapters_of_sizes(&[3000, 3000, 3000, 3000, 3000, 150]));
        assert_eq!(degenerate.check_result, Verdict::Fail);
        assert!(degenerate.details.contains("chapter_06.md"));

        let collapsed = h.length_stability(&chapters_of_sizes(&[4000, 4000, 4000, 4000, 500, 500]));
        assert_eq!(collapsed.check_result, Verdict::Fail);
        assert!(collapsed.reason.contains("collapsed"));

        let stable = h.length_stability(&chapters_of_sizes(&[3000, 3100, 2900, 3000, 2800, 2700]));
        assert_eq!(stable.check_result, Verdict::Pass);
    }

    #[test]
    fn test_paragraph_repetition_within_chapter() {
        let para = "她推开窗，看见远处的山门在晨雾中若隐若现，钟声一下一下地敲在心上，像是在催促她做出决定。这一次她不会再犹豫。";
        let chapters = vec![
            Chapter::new("c1.md", format!("{para}\n\nsomething else\n\n{para}")),
            Chapter::new("c2.md", "fresh text"),
        ];
        let result = ContentHeuristics::default().paragraph_repetition(&chapters);
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("[c1.md]"));
    }

    #[test]
    fn test_paragraph_repetition_across_chapters() {
        let paras: Vec<String> = (0..5).map(|i| format!("{i} {}", "shared paragraph text ".repeat(4))).collect();
        let joined = paras.join("\n\n");
        let chapters = vec![Chapter::new("c1.md", joined.clone()), Chapter::new("c2.md", joined)];
        let result = ContentHeuristics::default().paragraph_repetition(&chapters);
        assert_eq!(result.check_result, Verdict::Fail);

        let few = vec![
            Chapter::new("c1.md", paras[..4].join("\n\n")),
            Chapter::new("c2.md", paras[..4].join("\n\n")),
        ];
        assert_eq!(ContentHeuristics::default().paragraph_repetition(&few).check_result, Verdict::Pass);
    }
}
