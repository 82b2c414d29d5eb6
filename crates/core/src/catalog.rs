use rust_decimal::Decimal;

use crate::domain::product::{Product, ProductId};
use crate::domain::segment::Segment;

/// Read-only product lookup table.
pub struct Catalog {
    products: Vec<Product>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(default_products())
    }
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|product| &product.id == product_id)
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Product> {
        self.products.iter().filter(move |product| product.category == category)
    }

    pub fn search(&self, query: &str) -> Vec<&Product> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.products
            .iter()
            .filter(|product| {
                product.name.to_lowercase().contains(&needle) || product.id.0.contains(&needle)
            })
            .collect()
    }

    /// Three products per segment, in display order.
    pub fn suggestions_for(&self, segment: Segment) -> Vec<&Product> {
        let ids: [&str; 3] = match segment {
            Segment::Pastor => ["biblia-estudo", "envelope-500", "kit-pascoa"],
            Segment::Young => ["camiseta-fe-m", "biblia-nvi", "kit-natal"],
            Segment::Mother => ["kit-pascoa", "biblia-nvi", "camiseta-fe-m"],
            Segment::Faithful => ["biblia-king-james", "envelope-100", "kit-pascoa"],
            Segment::New => ["biblia-nvi", "camiseta-fe-m", "kit-pascoa"],
        };
        ids.iter().filter_map(|id| self.find(&ProductId((*id).to_owned()))).collect()
    }
}

fn product(id: &str, name: &str, price_cents: i64, category: &str, sizes: &[&str]) -> Product {
    Product {
        id: ProductId(id.to_owned()),
        name: name.to_owned(),
        price: Decimal::new(price_cents, 2),
        category: category.to_owned(),
        sizes: sizes.iter().map(|size| (*size).to_owned()).collect(),
        in_stock: true,
    }
}

fn default_products() -> Vec<Product> {
    vec![
        product("biblia-nvi", "Bíblia NVI", 8900, "biblia", &[]),
        product("biblia-king-james", "Bíblia King James", 12000, "biblia", &[]),
        product("biblia-estudo", "Bíblia de Estudo", 15000, "biblia", &[]),
        product("envelope-100", "Envelopes Dízimo - Pacote 100", 2500, "envelopes", &[]),
        product("envelope-500", "Envelopes Dízimo - Pacote 500", 9500, "envelopes", &[]),
        product("camiseta-fe-p", "Camiseta Fé - Tamanho P", 3900, "camisetas", &["P"]),
        product("camiseta-fe-m", "Camiseta Fé - Tamanho M", 3900, "camisetas", &["M"]),
        product("camiseta-fe-g", "Camiseta Fé - Tamanho G", 3900, "camisetas", &["G"]),
        product("camiseta-fe-gg", "Camiseta Fé - Tamanho GG", 3900, "camisetas", &["GG"]),
        product("kit-pascoa", "Kit Páscoa", 6700, "kits", &[]),
        product("kit-natal", "Kit Natal", 7800, "kits", &[]),
    ]
}
