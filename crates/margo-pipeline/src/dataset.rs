//! The five source datasets and their partition names

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    PosSales,
    InvoiceSales,
    Purchases,
    InventoryMoves,
    StockQuants,
}

pub struct DatasetSpec {
    /// Name of the raw/clean partition directories.
    pub dataset: &'static str,
    /// Name of the fact partition directory.
    pub fact: &'static str,
    /// Human label for logs and status output.
    pub label: &'static str,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::PosSales,
        Dataset::InvoiceSales,
        Dataset::Purchases,
        Dataset::InventoryMoves,
        Dataset::StockQuants,
    ];

    pub fn spec(self) -> &'static DatasetSpec {
        match self {
            Self::PosSales => &DatasetSpec {
                dataset: "pos_order_lines",
                fact: "fact_sales",
                label: "POS sales",
            },
            Self::InvoiceSales => &DatasetSpec {
                dataset: "invoice_sales_lines",
                fact: "fact_invoice_sales",
                label: "invoice sales",
            },
            Self::Purchases => &DatasetSpec {
                dataset: "purchase_lines",
                fact: "fact_purchases",
                label: "purchases",
            },
            Self::InventoryMoves => &DatasetSpec {
                dataset: "inventory_moves",
                fact: "fact_inventory_moves",
                label: "inventory moves",
            },
            Self::StockQuants => &DatasetSpec {
                dataset: "stock_quants",
                fact: "fact_stock_on_hand",
                label: "stock snapshots",
            },
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().dataset)
    }
}

impl std::str::FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.spec().dataset == s)
            .ok_or_else(|| format!("unknown dataset {s:?}"))
    }
}
