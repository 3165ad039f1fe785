use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use brandpulse_common::{ClassificationMap, Sentiment, UrlCategory};

use super::widening::StopReason;

/// How many categories the summary lists as "top".
pub const TOP_CATEGORIES: usize = 5;

/// Per-category tallies from one scraping run.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub queries: usize,
    pub urls_found: usize,
    pub categories: Vec<CategoryStats>,
    pub posts_collected: usize,
}

#[derive(Debug)]
pub struct CategoryStats {
    pub category: UrlCategory,
    pub urls: usize,
    pub accepted: usize,
    pub rounds: u32,
    pub rejected_by_date: usize,
    pub rejected_by_verifier: usize,
    pub stop: Option<StopReason>,
}

impl fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Scraping Run Complete ===")?;
        writeln!(f, "Queries:          {}", self.queries)?;
        writeln!(f, "URLs found:       {}", self.urls_found)?;
        for c in &self.categories {
            let stop = c.stop.map_or_else(|| "skipped".to_string(), |s| s.to_string());
            writeln!(
                f,
                "  {:<9} urls={:<3} accepted={:<3} rounds={} date_rejected={} off_topic={} ({stop})",
                c.category, c.urls, c.accepted, c.rounds, c.rejected_by_date, c.rejected_by_verifier,
            )?;
        }
        write!(f, "Posts collected:  {}", self.posts_collected)
    }
}

/// Counts for each of the three sentiment values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SentimentCounts<T> {
    pub positive: T,
    pub neutral: T,
    pub negative: T,
}

impl<T: Copy> SentimentCounts<T> {
    pub fn get(&self, sentiment: Sentiment) -> T {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Neutral => self.neutral,
            Sentiment::Negative => self.negative,
        }
    }
}

/// Statistics block of the brand report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub total: usize,
    pub sentiment_counts: SentimentCounts<usize>,
    /// Share of `total`, in percent, rounded to one decimal.
    pub percentages: SentimentCounts<f64>,
    /// Most frequent first; ties broken by name.
    pub category_counts: Vec<(String, usize)>,
    pub top_categories: Vec<(String, usize)>,
    pub categories_count: usize,
}

impl ClassificationSummary {
    pub fn from_classifications(classifications: &ClassificationMap) -> Self {
        let mut sentiment_counts = SentimentCounts::<usize>::default();
        let mut by_category: HashMap<&str, usize> = HashMap::new();
        for c in classifications.values() {
            match c.sentiment {
                Sentiment::Positive => sentiment_counts.positive += 1,
                Sentiment::Neutral => sentiment_counts.neutral += 1,
                Sentiment::Negative => sentiment_counts.negative += 1,
            }
            *by_category.entry(c.category.as_str()).or_default() += 1;
        }

        let total = classifications.len();
        let pct = |n: usize| {
            if total == 0 {
                0.0
            } else {
                (n as f64 / total as f64 * 1000.0).round() / 10.0
            }
        };
        let percentages = SentimentCounts {
            positive: pct(sentiment_counts.positive),
            neutral: pct(sentiment_counts.neutral),
            negative: pct(sentiment_counts.negative),
        };

        let mut category_counts: Vec<(String, usize)> = by_category
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        category_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_categories = category_counts.iter().take(TOP_CATEGORIES).cloned().collect();

        Self {
            total,
            sentiment_counts,
            percentages,
            categories_count: category_counts.len(),
            category_counts,
            top_categories,
        }
    }
}

impl fmt::Display for ClassificationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classified posts: {}", self.total)?;
        writeln!(f, "\nSentiment:")?;
        for s in Sentiment::ALL {
            writeln!(
                f,
                "  {:<9} {:>4} ({:.1}%)",
                s.as_str(),
                self.sentiment_counts.get(s),
                self.percentages.get(s)
            )?;
        }
        writeln!(f, "\nCategories ({}):", self.categories_count)?;
        for (name, count) in &self.top_categories {
            writeln!(f, "  {name}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandpulse_common::Classification;

    fn entry(category: &str, sentiment: Sentiment) -> Classification {
        Classification { category: category.into(), sentiment, url: None }
    }

    #[test]
    fn summary_counts_and_orders() {
        let mut map = ClassificationMap::new();
        map.insert(0, entry("Price", Sentiment::Negative));
        map.insert(1, entry("Price", Sentiment::Positive));
        map.insert(4, entry("Service", Sentiment::Positive));

        let summary = ClassificationSummary::from_classifications(&map);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.sentiment_counts, SentimentCounts { positive: 2, neutral: 0, negative: 1 });
        assert_eq!(summary.percentages.positive, 66.7);
        assert_eq!(summary.percentages.negative, 33.3);
        assert_eq!(summary.category_counts[0], ("Price".to_string(), 2));
        assert_eq!(summary.categories_count, 2);
    }

    #[test]
    fn top_categories_capped_at_five() {
        let map: ClassificationMap = (0..7)
            .map(|i| (i, entry(&format!("C{i}"), Sentiment::Neutral)))
            .collect();
        let summary = ClassificationSummary::from_classifications(&map);
        assert_eq!(summary.categories_count, 7);
        assert_eq!(summary.top_categories.len(), TOP_CATEGORIES);
        assert_eq!(summary.top_categories[0].0, "C0");
    }

    #[test]
    fn empty_summary_has_zero_percentages() {
        let summary = ClassificationSummary::from_classifications(&ClassificationMap::new());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percentages.neutral, 0.0);
    }
}
