use std::collections::HashSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::payload::{ListQuery, NewRequisition, QuotePayload};
use crate::domain::requisition::{ItemType, RequisitionId, RequisitionLineItem};

pub const RETURN_REASON_MIN_CHARS: usize = 10;
pub const RETURN_REASON_MAX_CHARS: usize = 500;
pub const BATCH_DELETE_MAX_IDS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem found in a payload. Validators collect all issues rather than stopping early.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { issues: vec![ValidationIssue::new(field, message)] }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(field, message));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.issues.extend(other.issues);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn blank(value: Option<&str>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}

/// Structural checks on a create payload. Reservation checks need contract data and run later.
pub fn validate_new_requisition(new: &NewRequisition) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if new.items.is_empty() {
        errors.push("items", "a requisition needs at least one line item");
    }

    for (index, item) in new.items.iter().enumerate() {
        let field = |name: &str| format!("items[{index}].{name}");
        if item.quantity <= Decimal::ZERO {
            errors.push(field("quantity"), "quantity must be greater than zero");
        }
        match item.item_type {
            ItemType::Main => {
                if item.contract_item_id.is_none() {
                    errors.push(
                        field("contract_item_id"),
                        "main material must reference a contract line item",
                    );
                }
            }
            ItemType::Auxiliary => {
                if item.contract_item_id.is_some() {
                    errors.push(
                        field("contract_item_id"),
                        "auxiliary material cannot reference a contract line item",
                    );
                }
                if item.item_name.trim().is_empty() {
                    errors.push(field("item_name"), "item name is required");
                }
                if blank(item.unit.as_deref()) {
                    errors.push(field("unit"), "unit is required");
                }
            }
        }
    }

    errors.into_result()
}

/// Quote payloads must price every line item exactly once with complete supplier details.
pub fn validate_quote(
    items: &[RequisitionLineItem],
    payload: &QuotePayload,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let known: HashSet<_> = items.iter().map(|item| item.id).collect();
    let mut seen = HashSet::new();

    for (index, quote) in payload.items.iter().enumerate() {
        let field = |name: &str| format!("items[{index}].{name}");
        if !known.contains(&quote.item_id) {
            errors.push(field("item_id"), format!("line item {} is not on this requisition", quote.item_id));
            continue;
        }
        if !seen.insert(quote.item_id) {
            errors.push(field("item_id"), format!("line item {} is quoted more than once", quote.item_id));
            continue;
        }

        let label = items
            .iter()
            .find(|item| item.id == quote.item_id)
            .map(|item| item.item_name.as_str())
            .unwrap_or_default();
        if quote.unit_price <= Decimal::ZERO {
            errors.push(field("unit_price"), format!("`{label}`: unit price must be greater than zero"));
        }
        let required = [
            ("supplier_name", quote.supplier_name.as_deref()),
            ("supplier_contact_person", quote.supplier_contact_person.as_deref()),
            ("supplier_contact", quote.supplier_contact.as_deref()),
            ("payment_method", quote.payment_method.as_deref()),
        ];
        for (name, value) in required {
            if blank(value) {
                errors.push(field(name), format!("`{label}`: {name} is required"));
            }
        }
        if quote.estimated_delivery.is_none() {
            errors.push(field("estimated_delivery"), format!("`{label}`: estimated_delivery is required"));
        }
    }

    for item in items.iter().filter(|item| !seen.contains(&item.id)) {
        errors.push(
            format!("item {}", item.id),
            format!("`{}` has no quote entry", item.item_name),
        );
    }

    errors.into_result()
}

/// Returns the trimmed reason when it is within bounds.
pub fn validate_return_reason(reason: &str) -> Result<String, ValidationErrors> {
    let trimmed = reason.trim();
    let length = trimmed.chars().count();
    if length < RETURN_REASON_MIN_CHARS {
        return Err(ValidationErrors::single(
            "reason",
            format!("return reason must be at least {RETURN_REASON_MIN_CHARS} characters"),
        ));
    }
    if length > RETURN_REASON_MAX_CHARS {
        return Err(ValidationErrors::single(
            "reason",
            format!("return reason must be at most {RETURN_REASON_MAX_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Rejections need a note; approvals may omit one. Blank notes collapse to `None`.
pub fn validate_decision_notes(
    rejecting: bool,
    notes: Option<&str>,
) -> Result<Option<String>, ValidationErrors> {
    let notes = notes.map(str::trim).filter(|notes| !notes.is_empty()).map(str::to_string);
    if rejecting && notes.is_none() {
        return Err(ValidationErrors::single("notes", "a rejection requires a note"));
    }
    Ok(notes)
}

pub fn validate_batch_ids(ids: &[RequisitionId]) -> Result<(), ValidationErrors> {
    if ids.is_empty() {
        return Err(ValidationErrors::single("ids", "at least one requisition id is required"));
    }
    if ids.len() > BATCH_DELETE_MAX_IDS {
        return Err(ValidationErrors::single(
            "ids",
            format!("at most {BATCH_DELETE_MAX_IDS} requisitions can be deleted at once"),
        ));
    }
    Ok(())
}

pub fn validate_list_query(query: &ListQuery) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if query.page == 0 {
        errors.push("page", "page must be at least 1");
    }
    if query.size == 0 || query.size > ListQuery::MAX_SIZE {
        errors.push("size", format!("size must be in range 1..={}", ListQuery::MAX_SIZE));
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        validate_batch_ids, validate_decision_notes, validate_list_query, validate_new_requisition,
        validate_quote, validate_return_reason,
    };
    use crate::domain::actor::ProjectId;
    use crate::domain::contract::ContractItemId;
    use crate::domain::payload::{ItemQuote, ListQuery, NewLineItem, NewRequisition, QuotePayload};
    use crate::domain::requisition::fixtures::line;
    use crate::domain::requisition::{ItemType, LineItemId, RequisitionId};

    fn quote_for(item_id: i64) -> ItemQuote {
        ItemQuote {
            item_id: LineItemId(item_id),
            unit_price: Decimal::new(1250, 2),
            supplier_name: Some("Acme Cabling".to_string()),
            supplier_contact_person: Some("Liu Yang".to_string()),
            supplier_contact: Some("138-0000-0000".to_string()),
            payment_method: Some("net 30".to_string()),
            estimated_delivery: NaiveDate::from_ymd_opt(2026, 11, 2),
        }
    }

    #[test]
    fn create_reports_every_offending_item() {
        let mut main_without_contract = NewLineItem::main(1, Decimal::from(5));
        main_without_contract.contract_item_id = None;
        let mut aux_with_contract = NewLineItem::auxiliary("Cable ties", "bag", Decimal::ZERO);
        aux_with_contract.contract_item_id = Some(ContractItemId(9));

        let errors = validate_new_requisition(&NewRequisition {
            project_id: ProjectId(3),
            required_date: None,
            remarks: None,
            items: vec![
                main_without_contract,
                aux_with_contract,
                NewLineItem::auxiliary("", "box", Decimal::ONE),
            ],
        })
        .expect_err("three bad items");

        assert!(errors.mentions("items[0].contract_item_id"));
        assert!(errors.mentions("items[1].contract_item_id"));
        assert!(errors.mentions("items[1].quantity"));
        assert!(errors.mentions("items[2].item_name"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn create_requires_at_least_one_item() {
        let errors = validate_new_requisition(&NewRequisition {
            project_id: ProjectId(3),
            required_date: None,
            remarks: None,
            items: Vec::new(),
        })
        .expect_err("empty");
        assert!(errors.mentions("items"));
    }

    #[test]
    fn quote_names_missing_fields_and_items() {
        let items = vec![line(1, ItemType::Main, 4), line(2, ItemType::Auxiliary, 2)];
        let mut incomplete = quote_for(1);
        incomplete.supplier_contact_person = Some("  ".to_string());
        incomplete.estimated_delivery = None;

        let errors = validate_quote(
            &items,
            &QuotePayload { items: vec![incomplete, quote_for(77)], quote_notes: None },
        )
        .expect_err("incomplete quote");

        assert!(errors.mentions("items[0].supplier_contact_person"));
        assert!(errors.mentions("items[0].estimated_delivery"));
        assert!(errors.mentions("items[1].item_id"));
        assert!(errors.mentions("item 2"));
        assert!(errors.to_string().contains("item-1"));
    }

    #[test]
    fn complete_quote_passes() {
        let items = vec![line(1, ItemType::Main, 4)];
        let payload = QuotePayload { items: vec![quote_for(1)], quote_notes: None };
        assert!(validate_quote(&items, &payload).is_ok());
    }

    #[test]
    fn non_positive_unit_price_is_rejected() {
        let items = vec![line(1, ItemType::Main, 4)];
        let mut quote = quote_for(1);
        quote.unit_price = Decimal::ZERO;
        let errors = validate_quote(&items, &QuotePayload { items: vec![quote], quote_notes: None })
            .expect_err("free items are not a quote");
        assert!(errors.mentions("items[0].unit_price"));
    }

    #[test]
    fn return_reason_is_trimmed_and_bounded() {
        assert!(validate_return_reason("short").is_err());
        assert!(validate_return_reason("   padded    ").is_err());
        assert!(validate_return_reason(&"x".repeat(501)).is_err());
        assert_eq!(
            validate_return_reason("  wrong cable grade  ").as_deref(),
            Ok("wrong cable grade")
        );
    }

    #[test]
    fn rejection_needs_a_note_but_approval_does_not() {
        assert!(validate_decision_notes(true, None).is_err());
        assert!(validate_decision_notes(true, Some("   ")).is_err());
        assert_eq!(validate_decision_notes(false, Some(" ")), Ok(None));
        assert_eq!(
            validate_decision_notes(true, Some("over budget")),
            Ok(Some("over budget".to_string()))
        );
    }

    #[test]
    fn batch_and_paging_bounds() {
        assert!(validate_batch_ids(&[]).is_err());
        let ids: Vec<RequisitionId> = (1..=101).map(RequisitionId).collect();
        assert!(validate_batch_ids(&ids).is_err());
        assert!(validate_batch_ids(&ids[..100]).is_ok());

        assert!(validate_list_query(&ListQuery::default()).is_ok());
        let errors = validate_list_query(&ListQuery { page: 0, size: 101, ..ListQuery::default() })
            .expect_err("bad paging");
        assert_eq!(errors.len(), 2);
    }
}
