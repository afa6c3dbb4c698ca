//! Competitor registry: the static catalogue a crawl run draws from.

use capwatch_shared::{AppConfig, Competitor, CompetitorCategory};

/// Immutable list of competitors, ordered by priority then name.
#[derive(Debug, Clone)]
pub struct Registry {
    competitors: Vec<Competitor>,
}

impl Registry {
    /// Build a registry from an arbitrary list.
    pub fn new(mut competitors: Vec<Competitor>) -> Self {
        competitors.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Self { competitors }
    }

    /// The built-in ERP competitor set.
    pub fn builtin() -> Self {
        use CompetitorCategory::{Modern, Traditional};

        Self::new(vec![
            Competitor::new(
                "NetSuite",
                "https://www.netsuite.com",
                Traditional,
                "Cloud ERP for finance, accounting, and operations",
                1,
            ),
            Competitor::new(
                "SAP",
                "https://www.sap.com",
                Traditional,
                "Enterprise ERP with finance, supply chain, and HR",
                1,
            ),
            Competitor::new(
                "Workday",
                "https://www.workday.com",
                Traditional,
                "Cloud ERP for finance, HR, and planning",
                1,
            ),
            Competitor::new(
                "Rillet",
                "https://www.rillet.com",
                Modern,
                "AI-native ERP for complex revenue models",
                1,
            ),
            Competitor::new(
                "DualEntry",
                "https://www.dualentry.com",
                Modern,
                "AI-native ERP with ML-powered automation",
                1,
            ),
            Competitor::new(
                "Oracle",
                "https://www.oracle.com",
                Traditional,
                "Cloud ERP for global multi-entity operations",
                2,
            ),
            Competitor::new(
                "Microsoft Dynamics 365",
                "https://dynamics.microsoft.com",
                Traditional,
                "Business applications for finance and operations",
                2,
            ),
            Competitor::new(
                "Sage Intacct",
                "https://www.sageintacct.com",
                Traditional,
                "Cloud accounting for mid-market",
                2,
            ),
            Competitor::new(
                "Digits",
                "https://digits.com",
                Modern,
                "AI-native accounting built for automation",
                2,
            ),
            Competitor::new(
                "Puzzle",
                "https://www.puzzle.io",
                Modern,
                "AI-powered accounting for startups",
                2,
            ),
            Competitor::new(
                "Acumatica",
                "https://www.acumatica.com",
                Traditional,
                "Cloud ERP for growing businesses",
                3,
            ),
            Competitor::new(
                "SAP Business One",
                "https://www.sap.com/products/erp/business-one.html",
                Traditional,
                "ERP for small and midsize businesses",
                3,
            ),
            Competitor::new(
                "Odoo",
                "https://www.odoo.com",
                Traditional,
                "Open-source business apps suite",
                3,
            ),
        ])
    }

    /// Registry from config: `[[competitors]]` replaces the built-in set.
    pub fn from_config(config: &AppConfig) -> Self {
        if config.competitors.is_empty() {
            Self::builtin()
        } else {
            Self::new(config.competitors.clone())
        }
    }

    /// Enabled competitors with `priority <= max_priority`.
    pub fn list(&self, max_priority: u8) -> Vec<Competitor> {
        self.competitors
            .iter()
            .filter(|c| c.enabled && c.priority <= max_priority)
            .cloned()
            .collect()
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&Competitor> {
        self.competitors
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Every competitor, including disabled ones.
    pub fn all(&self) -> &[Competitor] {
        &self.competitors
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
