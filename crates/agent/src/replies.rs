use vendedor_core::discount_engine::offer_block;
use vendedor_core::domain::discount::DiscountQuote;
use vendedor_core::domain::segment::Segment;

/// Used when the generator answers with nothing.
pub const EMPTY_REPLY: &str = "Desculpe, não consegui processar sua mensagem. Deus abençoe!";

const CATALOG_OVERVIEW: &str = "Olá! Temos uma variedade de produtos abençoados para você:

📖 Bíblias (NVI, King James, Estudo)
👕 Camisetas com frases inspiradoras
📮 Envelopes para dízimo
🎁 Materiais para campanhas especiais

Digite \"catálogo\" para ver todos os produtos e preços!

Deus abençoe! 🙏";

const PRICE_OVERVIEW: &str = "Nossos preços são muito especiais e abençoados!

📖 Bíblias a partir de R$ 89,00
👕 Camisetas por R$ 39,00
📮 Envelopes a partir de R$ 25,00

E temos descontos especiais para você! Digite \"catálogo\" para ver todos os produtos.

Deus abençoe! 🙏";

const PRAYER: &str = "Claro! É uma honra orar por você! 🙏

*Oração:* Pai celestial, abençoe este(a) irmão(ã) com sua graça e misericórdia. Guie seus \
passos e encha seu coração de paz e alegria. Em nome de Jesus, amém!

Como posso ajudá-lo(a) hoje? Temos produtos abençoados que podem fortalecer sua fé! ✨";

const WELCOME: &str = "Olá! Deus abençoe! 🙏

Sou o Mega Vendedor AI da Novo Israel. Como posso ajudá-lo(a) hoje?

Temos produtos especiais para fortalecer sua fé:
- Bíblias de qualidade
- Camisetas inspiradoras
- Materiais para igreja
- E muito mais!

Digite \"catálogo\" para ver nossos produtos ou me diga o que você está procurando! ✨";

/// Canned reply chosen by substring, first match wins.
pub fn fallback_reply(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    if mentions(&["produto", "bíblia", "camiseta"]) {
        CATALOG_OVERVIEW
    } else if mentions(&["preço", "quanto"]) {
        PRICE_OVERVIEW
    } else if mentions(&["orar", "oração"]) {
        PRAYER
    } else {
        WELCOME
    }
}

fn blessing_for(segment: Segment) -> &'static str {
    match segment {
        Segment::Pastor => "Deus abençoe, Pastor! 🙏",
        Segment::Young => "Deus abençoe! 😊",
        Segment::Mother => "Deus abençoe, querida! 💕",
        Segment::Faithful | Segment::New => "Deus abençoe! 🙏",
    }
}

/// Rewrites every "Deus abençoe" (and a trailing `!`) into the segment's blessing.
pub fn personalize_blessings(reply: &str, segment: Segment) -> String {
    const NEEDLE: &str = "Deus abençoe";
    let blessing = blessing_for(segment);
    let mut output = String::with_capacity(reply.len() + 16);
    let mut rest = reply;

    while let Some(index) = rest.find(NEEDLE) {
        output.push_str(&rest[..index]);
        output.push_str(blessing);
        rest = &rest[index + NEEDLE.len()..];
        rest = rest.strip_prefix('!').unwrap_or(rest);
    }
    output.push_str(rest);
    output
}

/// Greeting prefix, reply body, and the offer block when a discount applies.
pub fn compose_reply(segment: Segment, reply: &str, quote: &DiscountQuote) -> String {
    let mut composed = format!("{}{}", segment.greeting(), reply);
    if quote.discount_pct > 0 {
        composed.push_str(&offer_block(quote));
    }
    composed
}
