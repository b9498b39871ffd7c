//! Drug order row parsing.

use csv::StringRecord;
use medrec_types::DrugOrder;

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

/// Expected columns in a drug orders file.
const DRUG_ORDER_COLUMNS: &[&str] = &[
    "orderId",
    "patientId",
    "drugId",
    "conceptId",
    "startDate",
    "autoExpireDate",
    "discontinuedDate",
    "voided",
];

impl TsvRecord for DrugOrder {
    const EXPECTED_COLUMNS: &'static [&'static str] = DRUG_ORDER_COLUMNS;

    /// A blank `conceptId` is filled from the drug when the store links
    /// the order.
    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(DrugOrder {
            order_id: parse::id(parse::field(record, 0))?,
            patient_id: parse::id(parse::field(record, 1))?,
            drug_id: parse::id(parse::field(record, 2))?,
            concept_id: parse::optional_id(parse::field(record, 3))?.unwrap_or(0),
            start_date: parse::date(parse::field(record, 4))?,
            auto_expire_date: parse::optional_date(parse::field(record, 5))?,
            discontinued_date: parse::optional_date(parse::field(record, 6))?,
            voided: parse::boolean(parse::field(record, 7))?,
        })
    }

    fn passes_filter(&self, config: &LoadConfig) -> bool {
        config.include_voided || !self.voided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_record(fields: &[&str]) -> StringRecord {
        let mut record = StringRecord::new();
        for field in fields {
            record.push_field(field);
        }
        record
    }

    #[test]
    fn test_parse_drug_order_record() {
        let record = make_record(&["55", "7", "4", "", "2024-01-10", "2024-04-10", "", "0"]);

        let order = DrugOrder::from_record(&record).unwrap();
        assert_eq!(order.order_id, 55);
        assert_eq!(order.drug_id, 4);
        assert_eq!(order.concept_id, 0);
        assert_eq!(order.start_date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(order.auto_expire_date, NaiveDate::from_ymd_opt(2024, 4, 10));
        assert_eq!(order.discontinued_date, None);
    }

    #[test]
    fn test_missing_start_date_is_error() {
        let record = make_record(&["55", "7", "4", "", "", "", "", "0"]);
        assert!(DrugOrder::from_record(&record).is_err());
    }
}
