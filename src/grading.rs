use serde::Serialize;

use crate::analyzer::{self, QualityMetrics};
use crate::suite::{TestCase, TestResult};

// Category weights; the four together total 100 points.
const FUNCTIONALITY_MAX: f64 = 40.0;
const EFFICIENCY_MAX: f64 = 25.0;
const STYLE_MAX: f64 = 20.0;
const ROBUSTNESS_MAX: f64 = 15.0;

const VISIBLE_POINTS: f64 = 30.0;
const HIDDEN_POINTS: f64 = 6.0;
const COMPILE_BONUS: f64 = 4.0;

/// One weighted sub-score of the grade.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryScore {
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub rationale: String,
}

impl CategoryScore {
    fn new(score: f64, max_score: f64, rationale: String) -> Self {
        let score = score.clamp(0.0, max_score);
        Self {
            score,
            max_score,
            percentage: if max_score > 0.0 {
                score / max_score * 100.0
            } else {
                0.0
            },
            rationale,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeBreakdown {
    pub functionality: CategoryScore,
    pub efficiency: CategoryScore,
    pub style: CategoryScore,
    pub robustness: CategoryScore,
}

/// Aggregate timing over the suite.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub mean_time_ms: f64,
    pub max_time_ms: u64,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Excellent,
    Good,
    Fair,
    NeedsWork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// One ranked, actionable suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub area: String,
    pub priority: Priority,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub sentiment: Sentiment,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub quality: QualityMetrics,
    pub performance: PerformanceMetrics,
}

/// The final multi-dimensional grade for one submission.
#[derive(Debug, Clone, Serialize)]
pub struct Grade {
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub letter: char,
    pub breakdown: GradeBreakdown,
    pub feedback: Feedback,
    pub recommendations: Vec<Recommendation>,
}

/// Maps test outcomes plus static code metrics into a weighted grade.
///
/// Scoring is fully deterministic: the same code and the same results
/// always produce the same grade, and turning any failing case into a
/// passing one never lowers the score.
pub fn grade(source_code: &str, results: &[TestResult], cases: &[TestCase]) -> Grade {
    let quality = analyzer::analyze_quality(source_code);
    let performance = performance_metrics(results);

    let functionality = score_functionality(results, cases);
    let efficiency = score_efficiency(source_code, &quality, &performance);
    let style = score_style(source_code, &quality);
    let robustness = score_robustness(source_code, results, cases);

    let score =
        functionality.score + efficiency.score + style.score + robustness.score;
    let max_score =
        functionality.max_score + efficiency.max_score + style.max_score + robustness.max_score;
    let percentage = if max_score > 0.0 {
        score / max_score * 100.0
    } else {
        0.0
    };

    let letter = letter_grade(percentage);
    let sentiment = sentiment(percentage);
    let breakdown = GradeBreakdown {
        functionality,
        efficiency,
        style,
        robustness,
    };
    let (strengths, weaknesses) = strengths_and_weaknesses(&breakdown, results);
    let recommendations = recommendations(&breakdown, &quality, &performance, results, cases);

    Grade {
        score,
        max_score,
        percentage,
        letter,
        breakdown,
        feedback: Feedback {
            sentiment,
            strengths,
            weaknesses,
            quality,
            performance,
        },
        recommendations,
    }
}

fn performance_metrics(results: &[TestResult]) -> PerformanceMetrics {
    let total: u64 = results.iter().map(|r| r.elapsed_ms).sum();
    let max = results.iter().map(|r| r.elapsed_ms).max().unwrap_or(0);
    let mean = if results.is_empty() {
        0.0
    } else {
        total as f64 / results.len() as f64
    };
    PerformanceMetrics {
        mean_time_ms: mean,
        max_time_ms: max,
        total_time_ms: total,
    }
}

fn is_hidden(result: &TestResult, cases: &[TestCase]) -> bool {
    cases
        .iter()
        .find(|c| c.id == result.test_case_id)
        .is_some_and(|c| c.hidden)
}

/// Whether a case probes boundary conditions: flagged in its description,
/// or fed a zero, empty, or extreme numeric input.
fn is_edge_case(case: &TestCase) -> bool {
    let description = case.description.to_lowercase();
    if description.contains("edge") || description.contains("boundary") {
        return true;
    }
    let input = case.input.trim();
    if input.is_empty() || input == "0" {
        return true;
    }
    input
        .parse::<f64>()
        .is_ok_and(|n| n == 0.0 || n.abs() >= 1_000_000.0)
}

/// Whether every case at least got through the pipeline: no build failure,
/// timeout, supervisor fault, or rejection. A wrong answer or an abnormal
/// program exit does not forfeit the bonus.
fn all_cases_built(results: &[TestResult]) -> bool {
    results.iter().all(|r| r.failure.is_none())
}

fn pass_fraction<'a>(results: impl Iterator<Item = &'a TestResult>) -> Option<f64> {
    let mut passed = 0usize;
    let mut total = 0usize;
    for r in results {
        total += 1;
        if r.passed {
            passed += 1;
        }
    }
    (total > 0).then(|| passed as f64 / total as f64)
}

fn score_functionality(results: &[TestResult], cases: &[TestCase]) -> CategoryScore {
    if results.is_empty() {
        return CategoryScore::new(0.0, FUNCTIONALITY_MAX, "no test cases were run".to_string());
    }

    let overall = pass_fraction(results.iter()).unwrap_or(0.0);
    // Groups with no members fall back to the overall rate so a suite
    // without hidden cases can still reach full marks.
    let visible = pass_fraction(results.iter().filter(|r| !is_hidden(r, cases))).unwrap_or(overall);
    let hidden = pass_fraction(results.iter().filter(|r| is_hidden(r, cases))).unwrap_or(overall);

    let mut score = visible * VISIBLE_POINTS + hidden * HIDDEN_POINTS;
    let built = all_cases_built(results);
    if built {
        score += COMPILE_BONUS;
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let rationale = format!(
        "passed {passed} of {} cases{}",
        results.len(),
        if built {
            ", all cases built cleanly"
        } else {
            ", some cases failed to build or timed out"
        }
    );
    CategoryScore::new(score, FUNCTIONALITY_MAX, rationale)
}

fn score_efficiency(
    source_code: &str,
    quality: &QualityMetrics,
    performance: &PerformanceMetrics,
) -> CategoryScore {
    let time_points = match performance.mean_time_ms {
        t if t <= 100.0 => 10.0,
        t if t <= 500.0 => 8.0,
        t if t <= 1000.0 => 6.0,
        t if t <= 2000.0 => 4.0,
        _ => 2.0,
    };

    let line_count = source_code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count();
    let line_points = match line_count {
        0..=30 => 8.0,
        31..=60 => 6.0,
        61..=100 => 4.0,
        _ => 2.0,
    };

    let instruction_points = match quality.instruction_count {
        0..=25 => 7.0,
        26..=50 => 5.0,
        51..=100 => 3.0,
        _ => 1.0,
    };

    let rationale = format!(
        "mean case time {:.0}ms, {} lines, {} instructions",
        performance.mean_time_ms, line_count, quality.instruction_count
    );
    CategoryScore::new(
        time_points + line_points + instruction_points,
        EFFICIENCY_MAX,
        rationale,
    )
}

fn score_style(source_code: &str, quality: &QualityMetrics) -> CategoryScore {
    let comment_points = (quality.comment_ratio.min(0.5) / 0.5) * 10.0;
    let register_points = (quality.distinct_registers as f64 / 6.0).min(1.0) * 6.0;
    let indent_points = if analyzer::has_consistent_indentation(source_code)
        && quality.total_lines > 0
    {
        4.0
    } else {
        0.0
    };

    let rationale = format!(
        "{:.0}% commented lines, {} distinct registers, {} indentation",
        quality.comment_ratio * 100.0,
        quality.distinct_registers,
        if indent_points > 0.0 {
            "consistent"
        } else {
            "inconsistent"
        }
    );
    CategoryScore::new(
        comment_points + register_points + indent_points,
        STYLE_MAX,
        rationale,
    )
}

fn score_robustness(
    source_code: &str,
    results: &[TestResult],
    cases: &[TestCase],
) -> CategoryScore {
    let pairs = analyzer::comparison_branch_pairs(source_code);
    let branch_points = (pairs as f64 / 3.0).min(1.0) * 7.0;

    let edge_fraction = pass_fraction(results.iter().filter(|r| {
        cases
            .iter()
            .find(|c| c.id == r.test_case_id)
            .is_some_and(is_edge_case)
    }));
    // No edge cases in the suite: award the edge points on the overall
    // pass rate rather than zeroing a category the student cannot affect.
    let edge_fraction = edge_fraction
        .or_else(|| pass_fraction(results.iter()))
        .unwrap_or(0.0);
    let edge_points = edge_fraction * 8.0;

    let rationale = format!(
        "{pairs} compare-and-branch pairs, {:.0}% of boundary cases passed",
        edge_fraction * 100.0
    );
    CategoryScore::new(branch_points + edge_points, ROBUSTNESS_MAX, rationale)
}

fn letter_grade(percentage: f64) -> char {
    match percentage {
        p if p >= 90.0 => 'A',
        p if p >= 80.0 => 'B',
        p if p >= 70.0 => 'C',
        p if p >= 60.0 => 'D',
        _ => 'F',
    }
}

fn sentiment(percentage: f64) -> Sentiment {
    match percentage {
        p if p >= 90.0 => Sentiment::Excellent,
        p if p >= 75.0 => Sentiment::Good,
        p if p >= 60.0 => Sentiment::Fair,
        _ => Sentiment::NeedsWork,
    }
}

fn strengths_and_weaknesses(
    breakdown: &GradeBreakdown,
    results: &[TestResult],
) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();

    let categories = [
        ("functionality", &breakdown.functionality),
        ("efficiency", &breakdown.efficiency),
        ("style", &breakdown.style),
        ("robustness", &breakdown.robustness),
    ];
    for (name, category) in categories {
        if category.percentage >= 80.0 {
            strengths.push(format!("strong {name}: {}", category.rationale));
        } else if category.percentage < 50.0 {
            weaknesses.push(format!("weak {name}: {}", category.rationale));
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 && !results.is_empty() {
        strengths.push("every test case passed".to_string());
    } else if failed > 0 {
        weaknesses.push(format!("{failed} test case(s) still failing"));
    }

    (strengths, weaknesses)
}

fn recommendations(
    breakdown: &GradeBreakdown,
    quality: &QualityMetrics,
    performance: &PerformanceMetrics,
    results: &[TestResult],
    cases: &[TestCase],
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if !results.is_empty() && breakdown.functionality.percentage < 100.0 {
        let failed = results.iter().filter(|r| !r.passed).count();
        if failed > 0 {
            recs.push(Recommendation {
                area: "functionality".to_string(),
                priority: Priority::High,
                message: format!("fix the {failed} failing test case(s) first"),
            });
        }
    }

    if performance.mean_time_ms > 1000.0 {
        recs.push(Recommendation {
            area: "efficiency".to_string(),
            priority: Priority::High,
            message: format!(
                "mean execution time is {:.0}ms; reduce work in the hot loop",
                performance.mean_time_ms
            ),
        });
    }

    if quality.comment_ratio < 0.5 {
        recs.push(Recommendation {
            area: "style".to_string(),
            priority: Priority::Medium,
            message: "comment the intent of each block; under half the lines are documented"
                .to_string(),
        });
    }

    let hidden_failures = results
        .iter()
        .filter(|r| !r.passed && is_hidden(r, cases))
        .count();
    if hidden_failures > 0 {
        recs.push(Recommendation {
            area: "robustness".to_string(),
            priority: Priority::Medium,
            message: format!(
                "{hidden_failures} hidden case(s) failed; test boundary inputs like 0 and large values"
            ),
        });
    }

    if breakdown.style.percentage < 50.0 {
        recs.push(Recommendation {
            area: "style".to_string(),
            priority: Priority::Low,
            message: "indent instruction lines consistently and name registers deliberately"
                .to_string(),
        });
    }

    recs.sort_by(|a, b| b.priority.cmp(&a.priority));
    recs
}
