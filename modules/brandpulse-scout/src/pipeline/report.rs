//! Narrative brand report: the classification statistics plus a handful of
//! example comments per category, written up as markdown by the main model.

use std::sync::Arc;

use ai_client::{strip_code_blocks, truncate_to_char_boundary, TextModel};
use anyhow::{Context, Result};
use tracing::info;

use brandpulse_common::{BrandPulseError, Job, Taxonomy};

use super::stats::ClassificationSummary;

/// Example comments collected per category.
pub const EXAMPLES_PER_CATEGORY: usize = 3;
/// Categories whose examples are shown to the model.
pub const EXAMPLE_CATEGORIES: usize = 5;
pub const MAX_EXAMPLE_BYTES: usize = 200;

/// A generated report with the statistics it was written from.
#[derive(Debug, Clone)]
pub struct Report {
    pub markdown: String,
    pub summary: ClassificationSummary,
}

pub struct ReportGenerator {
    model: Arc<dyn TextModel>,
}

impl ReportGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Needs a taxonomy and at least one classification.
    pub async fn generate(&self, job: &Job) -> Result<Report> {
        let Some(taxonomy) = &job.taxonomy else {
            return Err(BrandPulseError::Precondition(
                "generate the category key before the report".to_string(),
            )
            .into());
        };
        if !job.has_classification() {
            return Err(BrandPulseError::Precondition(
                "classify the posts before generating a report".to_string(),
            )
            .into());
        }

        let summary = ClassificationSummary::from_classifications(&job.classifications);
        let examples = category_examples(job, &summary);
        info!(
            job_id = %job.id,
            brand = job.brand_name.as_str(),
            classified = summary.total,
            categories = summary.categories_count,
            "Generating report"
        );

        let reply = self
            .model
            .complete(&report_prompt(job, taxonomy, &summary, &examples))
            .await
            .context("report model call failed")?;

        let markdown = if reply.trim_start().starts_with("```") {
            strip_code_blocks(&reply).to_string()
        } else {
            reply.trim().to_string()
        };
        if markdown.is_empty() {
            return Err(BrandPulseError::Parse("report model returned no text".to_string()).into());
        }

        info!(job_id = %job.id, bytes = markdown.len(), "Report generated");
        Ok(Report { markdown, summary })
    }
}

/// Up to `EXAMPLES_PER_CATEGORY` post texts for each of the top categories,
/// in post order. Labels whose post has since moved are skipped.
fn category_examples(job: &Job, summary: &ClassificationSummary) -> Vec<(String, Vec<String>)> {
    summary
        .top_categories
        .iter()
        .take(EXAMPLE_CATEGORIES)
        .map(|(category, _)| {
            let texts = job
                .classifications
                .iter()
                .filter(|(_, c)| &c.category == category)
                .filter_map(|(index, c)| {
                    let post = job.posts.get(*index)?;
                    let current = c.url.as_deref().is_none_or(|url| url == post.url);
                    current.then_some(post)
                })
                .map(|post| truncate_to_char_boundary(post.text.trim(), MAX_EXAMPLE_BYTES).to_string())
                .filter(|text| !text.is_empty())
                .take(EXAMPLES_PER_CATEGORY)
                .collect();
            (category.clone(), texts)
        })
        .collect()
}

fn report_prompt(
    job: &Job,
    taxonomy: &Taxonomy,
    summary: &ClassificationSummary,
    examples: &[(String, Vec<String>)],
) -> String {
    let count_of = |name: &str| {
        summary
            .category_counts
            .iter()
            .find(|(category, _)| category == name)
            .map_or(0, |(_, count)| *count)
    };
    let per_aspect: String = taxonomy
        .aspects
        .iter()
        .map(|a| format!("- {}: {} ({})\n", a.aspect, count_of(&a.aspect), a.definition))
        .collect();
    let example_block: String = examples
        .iter()
        .filter(|(_, texts)| !texts.is_empty())
        .map(|(category, texts)| {
            let quoted: String = texts.iter().map(|t| format!("  - \"{t}\"\n")).collect();
            format!("{category}:\n{quoted}")
        })
        .collect();
    let top: String = summary
        .top_categories
        .iter()
        .map(|(category, count)| format!("- {category}: {count}\n"))
        .collect();
    let counts = &summary.sentiment_counts;
    let pct = &summary.percentages;
    let brand = &job.brand_name;

    format!(
        "Write an analytical report about how people talk about the brand \"{brand}\" on social media \
         between {start} and {end}.\n\n\
         Statistics:\n\
         - Classified comments: {total}\n\
         - Categories in use: {categories}\n\
         - Positive: {pos_n} ({pos_p:.1}%)\n\
         - Neutral: {neu_n} ({neu_p:.1}%)\n\
         - Negative: {neg_n} ({neg_p:.1}%)\n\n\
         Comments per category:\n{per_aspect}\n\
         Most discussed categories:\n{top}\n\
         Example comments:\n{example_block}\n\
         Sections:\n\
         1. Executive summary\n\
         2. Statistical analysis of sentiment\n\
         3. Analysis of the top categories\n\
         4. Conclusions and 3 to 5 recommendations\n\n\
         Write in markdown, roughly 800 to 1200 words, starting with the title \"# Brand report - {brand}\".",
        start = job.start_date,
        end = job.end_date,
        total = summary.total,
        categories = summary.categories_count,
        pos_n = counts.positive,
        neu_n = counts.neutral,
        neg_n = counts.negative,
        pos_p = pct.positive,
        neu_p = pct.neutral,
        neg_p = pct.negative,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandpulse_common::{Classification, Sentiment};

    use crate::testing::{post, taxonomy};

    fn labeled(category: &str, sentiment: Sentiment, url: &str) -> Classification {
        Classification {
            category: category.to_string(),
            sentiment,
            url: Some(url.to_string()),
        }
    }

    fn job_with_labels(n: usize) -> Job {
        let mut job = Job::new("Acme", "2025-01-01", "2025-01-31");
        job.posts = (0..n)
            .map(|i| post(&format!("https://www.facebook.com/acme/posts/{i}"), &format!("Food comment {i}")))
            .collect();
        for (i, p) in job.posts.iter().enumerate() {
            job.classifications.insert(i, labeled("Food", Sentiment::Positive, &p.url));
        }
        job.taxonomy = Some(taxonomy(&["Food", "Service"]));
        job
    }

    #[test]
    fn examples_are_capped_and_skip_moved_posts() {
        let mut job = job_with_labels(5);
        job.classifications.insert(
            0,
            labeled("Food", Sentiment::Positive, "https://www.facebook.com/acme/posts/other"),
        );
        let summary = ClassificationSummary::from_classifications(&job.classifications);

        let examples = category_examples(&job, &summary);

        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].1, vec!["Food comment 1", "Food comment 2", "Food comment 3"]);
    }

    #[test]
    fn long_examples_are_truncated() {
        let mut job = job_with_labels(1);
        job.posts[0].text = "ż".repeat(300);
        let summary = ClassificationSummary::from_classifications(&job.classifications);

        let examples = category_examples(&job, &summary);

        assert!(examples[0].1[0].len() <= MAX_EXAMPLE_BYTES);
    }

    #[test]
    fn prompt_lists_unused_aspects_with_zero() {
        let job = job_with_labels(2);
        let summary = ClassificationSummary::from_classifications(&job.classifications);
        let prompt = report_prompt(
            &job,
            job.taxonomy.as_ref().unwrap(),
            &summary,
            &category_examples(&job, &summary),
        );

        assert!(prompt.contains("- Food: 2"));
        assert!(prompt.contains("- Service: 0"));
        assert!(prompt.contains("Positive: 2 (100.0%)"));
        assert!(prompt.contains("\"Food comment 0\""));
        assert!(prompt.contains("# Brand report - Acme"));
    }
}
