//! Keyword-driven customer segmentation.
//!
//! Scores are accumulated per scored segment in the fixed priority order of
//! [`Segment::SCORED`]; ties resolve to the earlier segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cart::CartItem;
use crate::domain::conversation::ConversationContext;
use crate::domain::customer::CustomerProfile;
use crate::domain::segment::Segment;

const FORMAL_MARKERS: &[&str] = &["você", "senhor", "senhora"];
const INFORMAL_MARKERS: &[&str] = &["vc", "mano", "cara"];
const RELIGIOUS_MARKERS: &[&str] =
    &["deus", "jesus", "senhor", "bíblia", "igreja", "oração", "bênção", "amém"];
const MODERN_MARKERS: &[&str] = &["top", "show", "legal", "massa", "daora", "irado", "demais"];

const HISTORY_KEYWORD_WEIGHT: f64 = 0.5;
const LONG_KEYWORD_BONUS: f64 = 0.5;
const LONG_KEYWORD_CHARS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentKeywords {
    pub pastor: Vec<String>,
    pub young: Vec<String>,
    pub mother: Vec<String>,
    pub faithful: Vec<String>,
}

impl Default for SegmentKeywords {
    fn default() -> Self {
        Self {
            pastor: owned(&[
                "pastor",
                "pr",
                "reverendo",
                "ministro",
                "pregador",
                "igreja",
                "congregação",
                "sermão",
                "pregação",
                "ministério",
                "evangelho",
                "palavra de deus",
                "bíblia",
                "estudo bíblico",
                "discipulado",
                "liderança",
                "ovelhas",
                "rebanho",
            ]),
            young: owned(&[
                "jovem",
                "adolescente",
                "teen",
                "galera",
                "mano",
                "cara",
                "beleza",
                "top",
                "legal",
                "massa",
                "show",
                "daora",
                "foda",
                "maneiro",
                "irado",
                "demais",
                "instagram",
                "tiktok",
                "snapchat",
                "festa",
                "balada",
                "rolê",
                "encontro",
            ]),
            mother: owned(&[
                "mãe",
                "mamãe",
                "filho",
                "filha",
                "criança",
                "bebê",
                "família",
                "casa",
                "cozinha",
                "limpeza",
                "organização",
                "educação",
                "escola",
                "tarefa",
                "alimentação",
                "saúde",
                "cuidado",
                "amor",
                "carinho",
                "proteção",
            ]),
            faithful: owned(&[
                "fiel",
                "crente",
                "cristão",
                "evangélico",
                "protestante",
                "batista",
                "pentecostal",
                "assembleia",
                "igreja",
                "culto",
                "adoração",
                "louvor",
                "oração",
                "jejum",
                "dízimo",
                "oferta",
                "missão",
                "evangelismo",
            ]),
        }
    }
}

impl SegmentKeywords {
    pub fn for_segment(&self, segment: Segment) -> &[String] {
        match segment {
            Segment::Pastor => &self.pastor,
            Segment::Young => &self.young,
            Segment::Mother => &self.mother,
            Segment::Faithful => &self.faithful,
            Segment::New => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        Segment::SCORED.iter().all(|segment| !self.for_segment(*segment).is_empty())
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| (*word).to_owned()).collect()
}

/// One score per entry of [`Segment::SCORED`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SegmentScores([f64; 4]);

impl SegmentScores {
    pub fn get(&self, segment: Segment) -> f64 {
        slot(segment).map(|index| self.0[index]).unwrap_or(0.0)
    }

    fn add(&mut self, segment: Segment, amount: f64) {
        if let Some(index) = slot(segment) {
            self.0[index] += amount;
        }
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// First maximum in priority order; `New` when nothing scored.
    pub fn winner(&self) -> (Segment, f64) {
        let mut best = (Segment::New, 0.0);
        for segment in Segment::SCORED {
            let score = self.get(segment);
            if score > best.1 {
                best = (segment, score);
            }
        }
        best
    }

    pub fn confidence(&self) -> u8 {
        let (_, winning) = self.winner();
        let total = self.total();
        if total <= 0.0 {
            return 0;
        }
        let dominance = winning / total;
        let strength = (winning / 10.0).min(1.0);
        (100.0 * (0.7 * dominance + 0.3 * strength)).round().clamp(0.0, 100.0) as u8
    }
}

fn slot(segment: Segment) -> Option<usize> {
    Segment::SCORED.iter().position(|candidate| *candidate == segment)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LanguageStyle {
    pub formal: f64,
    pub informal: f64,
    pub religious: f64,
    pub modern: f64,
}

impl LanguageStyle {
    pub fn analyze(lowered: &str) -> Self {
        let formal = if contains_any(lowered, FORMAL_MARKERS) { 2.0 } else { 0.0 };
        let informal = if contains_any(lowered, INFORMAL_MARKERS) { 2.0 } else { 0.0 };
        Self {
            formal,
            informal,
            religious: count_matches(lowered, RELIGIOUS_MARKERS) as f64,
            modern: count_matches(lowered, MODERN_MARKERS) as f64,
        }
    }

    fn bonus_for(&self, segment: Segment) -> f64 {
        match segment {
            Segment::Pastor => self.formal * 0.5,
            Segment::Young => self.informal + self.modern,
            Segment::Mother => self.formal * 0.3,
            Segment::Faithful => self.religious,
            Segment::New => 0.0,
        }
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}

fn count_matches(text: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|marker| text.contains(*marker)).count()
}

#[derive(Clone, Debug, Default)]
pub struct ProfileDetector {
    keywords: SegmentKeywords,
}

impl ProfileDetector {
    pub fn new(keywords: SegmentKeywords) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &SegmentKeywords {
        &self.keywords
    }

    pub fn detect(
        &self,
        text: &str,
        context: &ConversationContext,
        cart: &[CartItem],
    ) -> CustomerProfile {
        self.detect_at(text, context, cart, Utc::now())
    }

    pub fn detect_at(
        &self,
        text: &str,
        context: &ConversationContext,
        cart: &[CartItem],
        now: DateTime<Utc>,
    ) -> CustomerProfile {
        let lowered = text.to_lowercase();
        let scores = self.score(&lowered, context, cart);
        let (segment, _) = scores.winner();
        let confidence = scores.confidence();
        let previous = &context.profile;

        let mut interests = previous.interests.clone();
        for tag in interest_tags(&lowered) {
            if !interests.iter().any(|existing| existing == tag) {
                interests.push(tag.to_owned());
            }
        }

        CustomerProfile {
            segment,
            confidence,
            interests,
            last_interaction: now,
            total_purchases: previous.total_purchases,
            discount_level: discount_level(segment, confidence, previous.total_purchases),
        }
    }

    /// Composite per-segment scores for already lower-cased text.
    pub fn score(
        &self,
        lowered: &str,
        context: &ConversationContext,
        cart: &[CartItem],
    ) -> SegmentScores {
        let style = LanguageStyle::analyze(lowered);
        let historical = self.historical_scores(context, cart);
        let mut scores = SegmentScores::default();

        for segment in Segment::SCORED {
            let keyword = keyword_score(lowered, self.keywords.for_segment(segment));
            scores.add(segment, keyword * 2.0 + style.bonus_for(segment) + historical.get(segment));
        }
        scores
    }

    fn historical_scores(&self, context: &ConversationContext, cart: &[CartItem]) -> SegmentScores {
        let mut scores = SegmentScores::default();

        for turn in context.user_turns() {
            let lowered = turn.text.to_lowercase();
            for segment in Segment::SCORED {
                let matched = self
                    .keywords
                    .for_segment(segment)
                    .iter()
                    .filter(|keyword| lowered.contains(keyword.as_str()))
                    .count();
                scores.add(segment, matched as f64 * HISTORY_KEYWORD_WEIGHT);
            }
        }

        for item in cart {
            for segment in category_segments(&item.category) {
                scores.add(*segment, 1.0);
            }
        }
        scores
    }
}

fn keyword_score(lowered: &str, keywords: &[String]) -> f64 {
    keywords
        .iter()
        .filter(|keyword| lowered.contains(keyword.as_str()))
        .map(|keyword| {
            if keyword.chars().count() > LONG_KEYWORD_CHARS {
                1.0 + LONG_KEYWORD_BONUS
            } else {
                1.0
            }
        })
        .sum()
}

fn category_segments(category: &str) -> &'static [Segment] {
    match category.trim().to_lowercase().as_str() {
        "biblia" | "bíblia" | "bible" | "envelopes" | "envelope" => {
            &[Segment::Pastor, Segment::Faithful]
        }
        "camisetas" | "shirts" => &[Segment::Young],
        "kits" => &[Segment::Mother],
        _ => &[],
    }
}

fn interest_tags(lowered: &str) -> Vec<&'static str> {
    let rules: [(&[&str], &[&str]); 6] = [
        (&["bíblia", "biblia"], &["bible", "study"]),
        (&["camiseta", "roupa"], &["fashion", "apparel"]),
        (&["envelope", "dízimo"], &["church", "admin"]),
        (&["kit", "páscoa", "natal"], &["seasonal", "celebration"]),
        (&["orar", "oração"], &["spiritual"]),
        (&["preço", "valor", "quanto"], &["economy"]),
    ];

    rules
        .iter()
        .filter(|(triggers, _)| contains_any(lowered, triggers))
        .flat_map(|(_, tags)| tags.iter().copied())
        .collect()
}

/// Level stored on the profile; the live offer is computed by the discount engine.
pub fn discount_level(segment: Segment, confidence: u8, total_purchases: u32) -> u8 {
    let mut level = u32::from(segment.base_discount());
    if confidence > 80 {
        level += 5;
    }
    if total_purchases > 0 {
        level += total_purchases.saturating_mul(2).min(10);
    }
    level.min(30) as u8
}

pub fn profile_changed(old: &CustomerProfile, new: &CustomerProfile) -> bool {
    old.segment != new.segment || old.confidence.abs_diff(new.confidence) > 20
}
