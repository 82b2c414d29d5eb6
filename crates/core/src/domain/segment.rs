use serde::{Deserialize, Serialize};

/// Inferred customer category. Drives greeting tone and base discount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Pastor,
    Young,
    Mother,
    Faithful,
    New,
}

impl Segment {
    /// Segments that can win a classification, in tie-break priority order.
    pub const SCORED: [Segment; 4] =
        [Segment::Pastor, Segment::Young, Segment::Mother, Segment::Faithful];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pastor => "pastor",
            Self::Young => "young",
            Self::Mother => "mother",
            Self::Faithful => "faithful",
            Self::New => "new",
        }
    }

    pub fn base_discount(&self) -> u8 {
        match self {
            Self::Pastor => 20,
            Self::Young => 10,
            Self::Mother => 15,
            Self::Faithful => 5,
            Self::New => 0,
        }
    }

    pub fn code_prefix(&self) -> &'static str {
        match self {
            Self::Pastor => "PR",
            Self::Young => "JV",
            Self::Mother => "MA",
            Self::Faithful => "FL",
            Self::New => "NI",
        }
    }

    pub fn greeting(&self) -> &'static str {
        match self {
            Self::Pastor => "Paz do Senhor, Pastor! 🙏 ",
            Self::Young => "E aí! 😊 ",
            Self::Mother => "Olá querida! 💕 ",
            Self::Faithful => "Deus abençoe! 🙏 ",
            Self::New => "Olá! Deus abençoe! 🙏 ",
        }
    }

    pub fn discount_reason(&self) -> &'static str {
        match self {
            Self::Pastor => "Desconto especial para pastores",
            Self::Young => "Desconto para jovens",
            Self::Mother => "Desconto para mães",
            Self::Faithful => "Desconto para fiéis",
            Self::New => "Desconto padrão",
        }
    }

    pub fn offer_blessing(&self) -> &'static str {
        match self {
            Self::Pastor => "Pastor, esta é uma bênção especial de Deus para seu ministério! 🙏",
            Self::Young => "E aí! Aproveita essa oferta massa! 😊",
            Self::Mother => "Querida, Deus tem algo especial preparado para você! 💕",
            Self::Faithful => "Fiel servo, Deus recompensa sua fidelidade! 🙏",
            Self::New => "Deus abençoe! Esta oferta é especial para você! ✨",
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Segment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pastor" => Ok(Self::Pastor),
            "young" => Ok(Self::Young),
            "mother" => Ok(Self::Mother),
            "faithful" => Ok(Self::Faithful),
            "new" => Ok(Self::New),
            other => Err(format!(
                "unsupported segment `{other}` (expected pastor|young|mother|faithful|new)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Segment;

    #[test]
    fn scored_segments_exclude_new_and_keep_priority_order() {
        assert_eq!(
            Segment::SCORED,
            [Segment::Pastor, Segment::Young, Segment::Mother, Segment::Faithful]
        );
    }

    #[test]
    fn parses_and_serializes_snake_case() {
        assert_eq!("Faithful".parse::<Segment>(), Ok(Segment::Faithful));
        assert!("elder".parse::<Segment>().is_err());
        assert_eq!(serde_json::to_string(&Segment::Young).expect("serialize"), "\"young\"");
    }
}
