use {
    super::money::{Currency, Money, MoneyAmount},
    serde::Serialize,
};

/// A purchasable credit tier. The catalog is the single source of truth for
/// prices and grant amounts; orders snapshot these values at creation and
/// nothing client-supplied ever reaches them.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    id: &'static str,
    name: &'static str,
    price_cents: i64,
    credits: i64,
    sandbox: bool,
}

impl Package {
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn price(&self) -> Money {
        Money::new(
            MoneyAmount::new(self.price_cents).expect("catalog prices are non-negative"),
            Currency::Usd,
        )
    }

    pub fn credits(&self) -> i64 {
        self.credits
    }

    /// Sandbox packages go through the gateway's test flow and come back
    /// with a mock payment id.
    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }
}

const CATALOG: &[Package] = &[
    Package {
        id: "test",
        name: "Test",
        price_cents: 10,
        credits: 1,
        sandbox: true,
    },
    Package {
        id: "explorer",
        name: "Explorer",
        price_cents: 1299,
        credits: 66,
        sandbox: false,
    },
    Package {
        id: "creative_world",
        name: "Creative World",
        price_cents: 2999,
        credits: 180,
        sandbox: false,
    },
    Package {
        id: "creative_teacher",
        name: "Creative Teacher",
        price_cents: 5999,
        credits: 400,
        sandbox: false,
    },
];

pub fn find(package_id: &str) -> Option<&'static Package> {
    CATALOG.iter().find(|p| p.id == package_id)
}

pub fn all() -> &'static [Package] {
    CATALOG
}
