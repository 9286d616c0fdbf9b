//! Inventory-link scoring rules and per-field selector cascades
//!
//! Both tables are plain data. Discovery scores every link against every
//! [`InventoryRule`]; extraction walks each [`SelectorCascade`] until the
//! first selector that produces a value.

/// A scoring rule for inventory-page discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRule {
    /// Matched against the lower-cased path of the resolved link
    pub path: &'static str,
    /// Matched against the lower-cased anchor text and href
    pub keywords: &'static [&'static str],
    pub score: u32,
}

impl InventoryRule {
    /// Score for one link: full score on a path hit, half on a keyword-only hit.
    pub fn score_link(&self, link_path: &str, anchor_text: &str, href: &str) -> u32 {
        let link_path = link_path.to_lowercase();
        if link_path.contains(self.path) {
            return self.score;
        }

        let anchor_text = anchor_text.to_lowercase();
        let href = href.to_lowercase();
        let keyword_hit = self
            .keywords
            .iter()
            .any(|kw| anchor_text.contains(kw) || href.contains(kw));

        if keyword_hit {
            self.score / 2
        } else {
            0
        }
    }
}

/// Where a field selector reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Text,
    Attr(&'static str),
}

/// One structural selector in a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSelector {
    pub css: &'static str,
    pub source: ValueSource,
}

impl FieldSelector {
    pub const fn text(css: &'static str) -> Self {
        Self {
            css,
            source: ValueSource::Text,
        }
    }

    pub const fn attr(css: &'static str, attr: &'static str) -> Self {
        Self {
            css,
            source: ValueSource::Attr(attr),
        }
    }
}

/// Ordered fallback selectors for one field, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCascade {
    pub selectors: Vec<FieldSelector>,
}

impl SelectorCascade {
    pub fn new(selectors: &[FieldSelector]) -> Self {
        Self {
            selectors: selectors.to_vec(),
        }
    }
}

/// Vehicle fields located inside a listing container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleField {
    Make,
    Model,
    Year,
    Trim,
    Price,
    Stock,
}

impl VehicleField {
    pub const ALL: [VehicleField; 6] = [
        VehicleField::Make,
        VehicleField::Model,
        VehicleField::Year,
        VehicleField::Trim,
        VehicleField::Price,
        VehicleField::Stock,
    ];
}

/// Selector cascades for the listing container and each field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelectors {
    pub container: SelectorCascade,
    pub make: SelectorCascade,
    pub model: SelectorCascade,
    pub year: SelectorCascade,
    pub trim: SelectorCascade,
    pub price: SelectorCascade,
    pub stock: SelectorCascade,
}

impl FieldSelectors {
    pub fn for_field(&self, field: VehicleField) -> &SelectorCascade {
        match field {
            VehicleField::Make => &self.make,
            VehicleField::Model => &self.model,
            VehicleField::Year => &self.year,
            VehicleField::Trim => &self.trim,
            VehicleField::Price => &self.price,
            VehicleField::Stock => &self.stock,
        }
    }
}

/// Both rule tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    pub inventory_rules: Vec<InventoryRule>,
    pub fields: FieldSelectors,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self {
            inventory_rules: INVENTORY_RULES.to_vec(),
            fields: default_field_selectors(),
        }
    }
}

/// Inventory-path rules in priority order
pub const INVENTORY_RULES: &[InventoryRule] = &[
    InventoryRule {
        path: "/new-vehicles",
        keywords: &["new vehicles", "new-vehicles"],
        score: 10,
    },
    InventoryRule {
        path: "/new-inventory",
        keywords: &["new inventory", "new-inventory"],
        score: 10,
    },
    InventoryRule {
        path: "/inventory/new",
        keywords: &["new cars", "shop new"],
        score: 9,
    },
    InventoryRule {
        path: "/used-vehicles",
        keywords: &["used vehicles", "used-vehicles"],
        score: 8,
    },
    InventoryRule {
        path: "/used-inventory",
        keywords: &["used inventory", "used cars"],
        score: 8,
    },
    InventoryRule {
        path: "/pre-owned",
        keywords: &["pre-owned", "preowned", "certified"],
        score: 7,
    },
    InventoryRule {
        path: "/inventory",
        keywords: &["inventory", "in stock"],
        score: 6,
    },
    InventoryRule {
        path: "/vehicles",
        keywords: &["vehicles", "browse cars"],
        score: 5,
    },
    InventoryRule {
        path: "/searchnew",
        keywords: &["search inventory", "search new"],
        score: 4,
    },
];

const CONTAINER: &[FieldSelector] = &[
    FieldSelector::text(".vehicle-card"),
    FieldSelector::text(".inventory-listing"),
    FieldSelector::text(".vehicle-item"),
    FieldSelector::text("[data-vehicle-id]"),
    FieldSelector::text(".srp-list-item"),
    FieldSelector::text(".result-tile"),
    FieldSelector::text("li.vehicle"),
    FieldSelector::text("article.vehicle"),
    FieldSelector::text(".vehicle"),
];

const MAKE: &[FieldSelector] = &[
    FieldSelector::attr("[data-make]", "data-make"),
    FieldSelector::text(".vehicle-make"),
    FieldSelector::text("[itemprop='brand']"),
    FieldSelector::text(".make"),
    FieldSelector::text("h2"),
    FieldSelector::text("h3"),
];

const MODEL: &[FieldSelector] = &[
    FieldSelector::attr("[data-model]", "data-model"),
    FieldSelector::text(".vehicle-model"),
    FieldSelector::text("[itemprop='model']"),
    FieldSelector::text(".model"),
    FieldSelector::text(".vehicle-title"),
    FieldSelector::text("h3"),
    FieldSelector::text("h4"),
];

const YEAR: &[FieldSelector] = &[
    FieldSelector::attr("[data-year]", "data-year"),
    FieldSelector::text(".vehicle-year"),
    FieldSelector::text("[itemprop='vehicleModelDate']"),
    FieldSelector::text(".year"),
    FieldSelector::text(".vehicle-title"),
    FieldSelector::text("h2"),
];

const TRIM: &[FieldSelector] = &[
    FieldSelector::attr("[data-trim]", "data-trim"),
    FieldSelector::text(".vehicle-trim"),
    FieldSelector::text(".trim"),
    FieldSelector::text(".vehicle-subtitle"),
];

const PRICE: &[FieldSelector] = &[
    FieldSelector::attr("[data-price]", "data-price"),
    FieldSelector::text(".final-price"),
    FieldSelector::text(".sale-price"),
    FieldSelector::text("[itemprop='price']"),
    FieldSelector::text(".vehicle-price"),
    FieldSelector::text(".price"),
];

const STOCK: &[FieldSelector] = &[
    FieldSelector::attr("[data-stock]", "data-stock"),
    FieldSelector::text(".stock-number"),
    FieldSelector::text(".vehicle-stock"),
    FieldSelector::text(".stock"),
];

fn default_field_selectors() -> FieldSelectors {
    FieldSelectors {
        container: SelectorCascade::new(CONTAINER),
        make: SelectorCascade::new(MAKE),
        model: SelectorCascade::new(MODEL),
        year: SelectorCascade::new(YEAR),
        trim: SelectorCascade::new(TRIM),
        price: SelectorCascade::new(PRICE),
        stock: SelectorCascade::new(STOCK),
    }
}
