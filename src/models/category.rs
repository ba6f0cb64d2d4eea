use serde::{Deserialize, Serialize};

/// Category code as it appears in records (e.g. `LEAD_QUALITY`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A configured business category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Phrases that hint at this category in a transcript
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CategoryDef {
    fn new(code: &str, name: &str, description: &str, keywords: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The fixed set of categories the classifier may emit
///
/// Membership is the only way to obtain a [`Category`], so a record holding a
/// category is guaranteed to name a configured one.
#[derive(Debug, Clone)]
pub struct CategorySet {
    defs: Vec<CategoryDef>,
}

impl CategorySet {
    pub fn new(defs: Vec<CategoryDef>) -> anyhow::Result<Self> {
        if defs.is_empty() {
            anyhow::bail!("category set must not be empty");
        }
        let mut seen = std::collections::HashSet::new();
        let defs = defs
            .into_iter()
            .map(|mut def| {
                def.code = normalize_code(&def.code);
                def
            })
            .collect::<Vec<_>>();
        for def in &defs {
            if def.code.is_empty() {
                anyhow::bail!("category code must not be empty");
            }
            if !seen.insert(def.code.clone()) {
                anyhow::bail!("duplicate category code: {}", def.code);
            }
        }
        Ok(Self { defs })
    }

    /// Look up a category code, tolerating case and separator differences
    pub fn resolve(&self, raw: &str) -> Option<Category> {
        let code = normalize_code(raw);
        self.defs
            .iter()
            .find(|d| d.code == code)
            .map(|d| Category(d.code.clone()))
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.defs.iter().any(|d| d.code == category.0)
    }

    pub fn get(&self, category: &Category) -> Option<&CategoryDef> {
        self.defs.iter().find(|d| d.code == category.0)
    }

    /// Display name for a category, falling back to its code
    pub fn display_name<'a>(&'a self, category: &'a Category) -> &'a str {
        self.get(category).map(|d| d.name.as_str()).unwrap_or(category.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDef> {
        self.defs.iter()
    }

    pub fn codes(&self) -> Vec<&str> {
        self.defs.iter().map(|d| d.code.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            defs: default_categories(),
        }
    }
}

/// Upper-case and turn spaces and hyphens into underscores
pub fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn default_categories() -> Vec<CategoryDef> {
    vec![
        CategoryDef::new(
            "LEAD_QUALITY",
            "BuyLead Quality Issues",
            "BL quality problems, irrelevant leads, spam leads, leads from the wrong city",
            &["fake leads", "irrelevant leads", "wrong leads", "bl quality", "spam", "galat", "leads"],
        ),
        CategoryDef::new(
            "PAYMENT_BILLING",
            "Payment & Billing",
            "Payment delays, invoice issues, refunds, subscription charges",
            &["payment", "refund", "invoice", "billing", "charges", "paisa", "paise"],
        ),
        CategoryDef::new(
            "CATALOG_MANAGEMENT",
            "Catalog & Listing Issues",
            "Product listing, images, CQS, A Rank, D Rank, MCAT issues, ISQ",
            &["catalog", "listing", "images", "cqs", "rank", "mcat", "isq", "product addition"],
        ),
        CategoryDef::new(
            "SUBSCRIPTION_RENEWAL",
            "Subscription & Renewal",
            "Subscription plans, renewals, upgrades, plan features",
            &["subscription", "renewal", "plan", "validity", "package"],
        ),
        CategoryDef::new(
            "TECHNICAL_ISSUES",
            "Technical Problems",
            "App/website bugs, Seller Panel issues, LMS problems, login issues",
            &["app", "website", "login", "otp", "error", "bug", "seller panel", "lms"],
        ),
        CategoryDef::new(
            "BUYLEAD_CONSUMPTION",
            "BuyLead Consumption",
            "BL credits, consumption, shortlisting, callbacks, replies tracking",
            &["buylead", "credits", "consumption", "shortlist", "reply"],
        ),
        CategoryDef::new(
            "SELLER_EDUCATION",
            "Seller Education Needed",
            "Seller needs training on Seller Panel, LMS, BLs, DIY catalog, product addition",
            &["how to", "don't know", "explain", "training", "samajh", "sikha"],
        ),
        CategoryDef::new(
            "ONBOARDING_ISSUES",
            "Onboarding & Verification",
            "Verification hurdles, new seller setup, documentation",
            &["onboarding", "verification", "document", "new seller", "setup", "gst"],
        ),
        CategoryDef::new(
            "CHURN_RISK",
            "Churn Risk Signals",
            "Discontinuation intent, dissatisfaction, competitor mentions",
            &["cancel", "discontinue", "band kar", "waste", "competitor", "not working"],
        ),
        CategoryDef::new(
            "RETENTION_OPPORTUNITY",
            "Retention Enhancement",
            "Engaged but not renewing, needs intervention, winback opportunity",
            &["not renewing", "sochenge", "maybe", "will see", "next time"],
        ),
        CategoryDef::new(
            "SERVICE_ESCALATION",
            "Service Escalation",
            "Escalated complaints, repeated tickets, unresolved issues, TAT breaches",
            &["escalation", "manager", "senior", "complaint", "not resolved", "ticket"],
        ),
        CategoryDef::new(
            "PRODUCTION_SUPPORT",
            "Production Team Support Needed",
            "Catalog enrichment, image upload help, professional catalog creation",
            &["production", "image upload", "help needed", "professional", "enhance"],
        ),
        CategoryDef::new(
            "UPSELL_OPPORTUNITY",
            "Upsell Opportunity",
            "Seller shows interest in higher plans, more features, expansion",
            &["upgrade", "more leads", "premium", "better plan", "expand"],
        ),
        CategoryDef::new(
            "POSITIVE_FEEDBACK",
            "Positive Feedback",
            "Satisfaction, success stories, good experience, orders received",
            &["thank you", "happy", "satisfied", "excellent", "order received", "accha"],
        ),
        CategoryDef::new(
            "FOLLOW_UP_REQUIRED",
            "Follow-up Required",
            "Callback needed, pending resolution",
            &["callback", "follow up", "call again", "get back", "pending"],
        ),
        CategoryDef::new(
            "MISCELLANEOUS",
            "Miscellaneous",
            "Other issues not fitting the categories above",
            &[],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_has_sixteen_unique_codes() {
        let set = CategorySet::default();
        assert_eq!(set.len(), 16);
        let rebuilt = CategorySet::new(set.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.codes(), set.codes());
    }

    #[test]
    fn test_resolve_tolerates_case_and_separators() {
        let set = CategorySet::default();
        let category = set.resolve("lead quality").unwrap();
        assert_eq!(category.as_str(), "LEAD_QUALITY");
        assert_eq!(set.resolve("Payment-Billing").unwrap().as_str(), "PAYMENT_BILLING");
        assert!(set.resolve("ACCOUNT_MANAGEMENT").is_none());
        assert_eq!(set.display_name(&category), "BuyLead Quality Issues");
    }

    #[test]
    fn test_new_rejects_duplicates_and_empty() {
        assert!(CategorySet::new(vec![]).is_err());
        let dup = vec![
            CategoryDef::new("A", "a", "", &[]),
            CategoryDef::new("a", "a again", "", &[]),
        ];
        assert!(CategorySet::new(dup).is_err());
    }
}
