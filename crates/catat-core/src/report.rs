//! Income/expense rollups over a date window

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, FixedOffset, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Transaction, TransactionType};

/// Bucket for transactions recorded without a category
pub const UNCATEGORIZED: &str = "lainnya";

/// Totals for one user over `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_income: f64,
    pub total_expense: f64,
    pub net_balance: f64,
    /// Sum of amounts per category, both directions
    pub by_category: BTreeMap<String, f64>,
    pub transaction_count: usize,
}

/// Roll up a set of transactions
pub fn summarize(transactions: &[Transaction], start: NaiveDate, end: NaiveDate) -> ReportSummary {
    let mut total_income = 0.0;
    let mut total_expense = 0.0;
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();

    for tx in transactions {
        match tx.tx_type {
            TransactionType::Income => total_income += tx.amount,
            TransactionType::Expense => total_expense += tx.amount,
        }
        let category = match tx.category.trim() {
            "" => UNCATEGORIZED,
            name => name,
        };
        *by_category.entry(category.to_string()).or_default() += tx.amount;
    }

    ReportSummary {
        start,
        end,
        total_income,
        total_expense,
        net_balance: total_income - total_expense,
        by_category,
        transaction_count: transactions.len(),
    }
}

/// Report for live transactions dated in `[start, end)`
pub fn generate_report(
    db: &Database,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ReportSummary> {
    let transactions = db.transactions_in_range(user_id, start, end)?;
    Ok(summarize(&transactions, start, end))
}

/// Report window a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Today,
    /// Monday-based week containing today
    ThisWeek,
    ThisMonth,
}

impl ReportPeriod {
    /// Pick a period from free text ("rekap hari ini", "laporan bulan ini", ...)
    ///
    /// Defaults to today when no period word is present.
    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("bulan") || text.contains("month") {
            Self::ThisMonth
        } else if text.contains("minggu") || text.contains("week") {
            Self::ThisWeek
        } else {
            Self::Today
        }
    }

    /// Title used in the chat reply
    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Hari Ini",
            Self::ThisWeek => "Minggu Ini",
            Self::ThisMonth => "Bulan Ini",
        }
    }

    /// `[start, end)` containing `today`
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Today => (today, today + Duration::days(1)),
            Self::ThisWeek => {
                let start =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (start, start + Duration::days(7))
            }
            Self::ThisMonth => {
                let start = today.with_day(1).unwrap_or(today);
                let end = start
                    .checked_add_months(Months::new(1))
                    .unwrap_or(start + Duration::days(31));
                (start, end)
            }
        }
    }

    /// `range` for the current local date in `offset`
    pub fn current_range(&self, offset: FixedOffset) -> (NaiveDate, NaiveDate) {
        self.range(Utc::now().with_timezone(&offset).date_naive())
    }
}

impl std::str::FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "today" | "day" | "daily" | "hari" => Ok(Self::Today),
            "week" | "weekly" | "minggu" => Ok(Self::ThisWeek),
            "month" | "monthly" | "bulan" => Ok(Self::ThisMonth),
            _ => Err(format!("Unknown report period: {}", s)),
        }
    }
}

/// Format an amount as Rupiah with dot thousands separators
pub fn format_rupiah(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if rounded < 0 {
        format!("-Rp {}", out)
    } else {
        format!("Rp {}", out)
    }
}

/// Chat reply for a report
pub fn format_report(summary: &ReportSummary, period_label: &str) -> String {
    let mut out = format!("📊 *Rekap {}*\n\n", period_label);
    out.push_str(&format!("💰 Pemasukan: {}\n", format_rupiah(summary.total_income)));
    out.push_str(&format!("💸 Pengeluaran: {}\n", format_rupiah(summary.total_expense)));
    out.push_str(&format!("📈 Saldo Bersih: {}\n", format_rupiah(summary.net_balance)));

    if summary.transaction_count == 0 {
        out.push_str("\nBelum ada transaksi di periode ini.");
        return out;
    }

    if !summary.by_category.is_empty() {
        let mut categories: Vec<(&String, &f64)> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

        out.push_str("\n🏷️ *Top Kategori:*\n");
        for (category, amount) in categories.into_iter().take(5) {
            out.push_str(&format!("  • {}: {}\n", category, format_rupiah(*amount)));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(tx_type: TransactionType, amount: f64, category: &str) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: 0,
            reference: String::new(),
            user_id: 1,
            tx_type,
            amount,
            category: category.to_string(),
            description: String::new(),
            transaction_date: now.date_naive(),
            source_message_id: String::new(),
            confidence: 0.9,
            extraction_version: "mock".to_string(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_summarize_totals() {
        let txs = vec![
            tx(TransactionType::Income, 100.0, "gaji"),
            tx(TransactionType::Expense, 30.0, "makan"),
            tx(TransactionType::Expense, 20.0, "transport"),
        ];
        let s = summarize(&txs, d(2025, 1, 1), d(2025, 2, 1));
        assert_eq!(s.total_income, 100.0);
        assert_eq!(s.total_expense, 50.0);
        assert_eq!(s.net_balance, 50.0);
        assert_eq!(s.by_category.len(), 3);
        assert_eq!(s.by_category["makan"], 30.0);
        assert_eq!(s.transaction_count, 3);
    }

    #[test]
    fn test_summarize_empty_category_bucketed() {
        let txs = vec![
            tx(TransactionType::Expense, 10.0, ""),
            tx(TransactionType::Expense, 5.0, "  "),
            tx(TransactionType::Expense, 7.0, "lainnya"),
            tx(TransactionType::Income, 40.0, "gaji"),
        ];
        let s = summarize(&txs, d(2025, 1, 1), d(2025, 2, 1));
        assert_eq!(s.by_category.len(), 2);
        assert_eq!(s.by_category[UNCATEGORIZED], 22.0);
        let bucketed: f64 = s.by_category.values().sum();
        assert_eq!(bucketed, s.total_income + s.total_expense);
    }

    #[test]
    fn test_period_from_text() {
        assert_eq!(ReportPeriod::from_text("rekap hari ini"), ReportPeriod::Today);
        assert_eq!(ReportPeriod::from_text("laporan minggu ini"), ReportPeriod::ThisWeek);
        assert_eq!(ReportPeriod::from_text("Rekap Bulan Ini"), ReportPeriod::ThisMonth);
        assert_eq!(ReportPeriod::from_text("rekap"), ReportPeriod::Today);
    }

    #[test]
    fn test_period_ranges() {
        // 2025-05-15 is a Thursday
        let today = d(2025, 5, 15);
        assert_eq!(ReportPeriod::Today.range(today), (today, d(2025, 5, 16)));
        assert_eq!(ReportPeriod::ThisWeek.range(today), (d(2025, 5, 12), d(2025, 5, 19)));
        assert_eq!(ReportPeriod::ThisMonth.range(today), (d(2025, 5, 1), d(2025, 6, 1)));
        assert_eq!(
            ReportPeriod::ThisMonth.range(d(2025, 12, 31)),
            (d(2025, 12, 1), d(2026, 1, 1))
        );
        // Monday maps to itself
        assert_eq!(ReportPeriod::ThisWeek.range(d(2025, 5, 12)).0, d(2025, 5, 12));
    }

    #[test]
    fn test_format_rupiah() {
        assert_eq!(format_rupiah(0.0), "Rp 0");
        assert_eq!(format_rupiah(950.0), "Rp 950");
        assert_eq!(format_rupiah(50000.0), "Rp 50.000");
        assert_eq!(format_rupiah(20000000.0), "Rp 20.000.000");
        assert_eq!(format_rupiah(-1500.0), "-Rp 1.500");
    }

    #[test]
    fn test_format_report() {
        let txs = vec![
            tx(TransactionType::Income, 100000.0, "gaji"),
            tx(TransactionType::Expense, 30000.0, "makan"),
        ];
        let s = summarize(&txs, d(2025, 1, 1), d(2025, 1, 2));
        let text = format_report(&s, ReportPeriod::Today.label());
        assert!(text.contains("Rekap Hari Ini"));
        assert!(text.contains("Pemasukan: Rp 100.000"));
        assert!(text.contains("Saldo Bersih: Rp 70.000"));
        assert!(text.find("gaji").unwrap() < text.find("makan").unwrap());

        let empty = summarize(&[], d(2025, 1, 1), d(2025, 1, 2));
        assert!(format_report(&empty, "Hari Ini").contains("Belum ada transaksi"));
    }
}
