use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// 订阅扣费周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillingFrequency {
    Monthly,
    Bimonthly,
    Quarterly,
    SemiAnnual,
}

impl BillingFrequency {
    pub fn period(&self) -> Duration {
        match self {
            BillingFrequency::Monthly => Duration::days(30),
            BillingFrequency::Bimonthly => Duration::days(60),
            BillingFrequency::Quarterly => Duration::days(90),
            BillingFrequency::SemiAnnual => Duration::days(180),
        }
    }
}

/// 债权人别名: 单据供应商行以 prefix 开头且 (postfix 为空或) 以 postfix 结尾即命中
///
/// 带 `frequency` 与 `start_date` 的别名为订阅别名，可按扣费计划推算账单日期。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditorAlias {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub postfix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<BillingFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

impl CreditorAlias {
    pub fn matches(&self, line: &str) -> bool {
        !self.is_blank()
            && line.starts_with(&self.prefix)
            && (self.postfix.is_empty() || line.ends_with(&self.postfix))
    }

    fn is_blank(&self) -> bool {
        self.prefix.is_empty() && self.postfix.is_empty()
    }

    /// 从 start_date 起按周期推算的账单日期，截止到 `until` 之后一个周期
    ///
    /// 非订阅别名返回空列表。
    pub fn billing_dates(&self, until: NaiveDate) -> Vec<NaiveDate> {
        let (Some(frequency), Some(start)) = (self.frequency, self.start_date) else {
            return Vec::new();
        };
        let period = frequency.period();
        let last = until + period;
        let mut dates = Vec::new();
        let mut current = start;
        while current <= last {
            dates.push(current);
            current += period;
        }
        dates
    }
}

/// 债权人
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creditor {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<CreditorAlias>,
}

impl Creditor {
    /// 任一供应商行命中任一别名
    pub fn matches_any(&self, vendor_lines: &[String]) -> bool {
        self.aliases
            .iter()
            .any(|alias| vendor_lines.iter().any(|line| alias.matches(line)))
    }

    /// 命中供应商行的订阅别名
    pub fn subscription_aliases<'a>(
        &'a self,
        vendor_lines: &'a [String],
    ) -> impl Iterator<Item = &'a CreditorAlias> + 'a {
        self.aliases.iter().filter(move |alias| {
            alias.frequency.is_some()
                && alias.start_date.is_some()
                && vendor_lines.iter().any(|line| alias.matches(line))
        })
    }
}
