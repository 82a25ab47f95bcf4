//! Customer identity resolution.

use z_margin_core::{Customer, CustomerId, MarginError, Result, SourceKind};
use z_margin_store::CustomerDirectory;

use super::CustomerRef;

/// How a record's customer was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The canonical customer after applying the record's metadata.
    pub customer: Customer,
    /// Whether the customer was created by this record.
    pub created: bool,
    /// Whether an existing customer's metadata changed.
    pub updated: bool,
}

/// Resolve the canonical customer for `(source, customer.key)`.
///
/// With an explicit `reference`, the key is linked to that existing customer.
/// Otherwise the customer already linked to the key is returned, or a new one
/// is created. Record metadata is applied in every case.
///
/// # Errors
///
/// Returns `MarginError::UnknownCustomerReference` if `reference` is not the
/// ID of an existing customer, and storage errors from the directory.
pub fn resolve_customer<D: CustomerDirectory + ?Sized>(
    directory: &D,
    source: SourceKind,
    customer: &CustomerRef,
) -> Result<Resolution> {
    if let Some(reference) = &customer.reference {
        return resolve_reference(directory, source, customer, reference);
    }

    if let Some(existing) = directory.customer_for_key(source, &customer.key)? {
        return apply(directory, existing, customer);
    }

    let mut fresh = Customer::new(source, customer.key.clone());
    fresh.apply_metadata(&customer.metadata);
    let (stored, created) = directory.insert_customer_if_absent(fresh)?;
    if created {
        tracing::debug!(
            customer_id = %stored.id,
            source = %source,
            source_key = %customer.key,
            "Created customer"
        );
        return Ok(Resolution {
            customer: stored,
            created: true,
            updated: false,
        });
    }
    // Another writer created it between the lookup and the insert.
    apply(directory, stored, customer)
}

fn resolve_reference<D: CustomerDirectory + ?Sized>(
    directory: &D,
    source: SourceKind,
    customer: &CustomerRef,
    reference: &str,
) -> Result<Resolution> {
    let unknown = || MarginError::UnknownCustomerReference {
        reference: reference.to_string(),
    };

    let id: CustomerId = reference.parse().map_err(|_| unknown())?;
    let target = directory.get_customer(&id)?.ok_or_else(unknown)?;

    let linked = directory
        .customer_for_key(source, &customer.key)?
        .is_some_and(|c| c.id == id);
    if !linked {
        directory.link_source_key(source, &customer.key, &id)?;
        tracing::debug!(
            customer_id = %id,
            source = %source,
            source_key = %customer.key,
            "Linked source key to customer"
        );
    }

    apply(directory, target, customer)
}

fn apply<D: CustomerDirectory + ?Sized>(
    directory: &D,
    mut existing: Customer,
    customer: &CustomerRef,
) -> Result<Resolution> {
    let updated = existing.apply_metadata(&customer.metadata);
    if updated {
        directory.update_customer(&existing)?;
    }
    Ok(Resolution {
        customer: existing,
        created: false,
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use z_margin_core::CustomerMetadata;
    use z_margin_store::MemoryStore;

    fn reference(key: &str) -> CustomerRef {
        CustomerRef {
            key: key.to_string(),
            reference: None,
            metadata: CustomerMetadata::default(),
        }
    }

    #[test]
    fn creates_then_reuses() {
        let store = MemoryStore::new();
        let first = resolve_customer(&store, SourceKind::Stripe, &reference("cus_1")).unwrap();
        assert!(first.created);

        let second = resolve_customer(&store, SourceKind::Stripe, &reference("cus_1")).unwrap();
        assert!(!second.created);
        assert!(!second.updated);
        assert_eq!(first.customer.id, second.customer.id);
    }

    #[test]
    fn same_key_in_other_source_is_another_customer() {
        let store = MemoryStore::new();
        let a = resolve_customer(&store, SourceKind::Stripe, &reference("x")).unwrap();
        let b = resolve_customer(&store, SourceKind::Lago, &reference("x")).unwrap();
        assert_ne!(a.customer.id, b.customer.id);
    }

    #[test]
    fn metadata_change_updates() {
        let store = MemoryStore::new();
        resolve_customer(&store, SourceKind::Metering, &reference("acme")).unwrap();

        let mut with_plan = reference("acme");
        with_plan.metadata.plan = Some("enterprise".into());
        let resolution = resolve_customer(&store, SourceKind::Metering, &with_plan).unwrap();
        assert!(resolution.updated);

        let stored = store
            .customer_for_key(SourceKind::Metering, "acme")
            .unwrap()
            .unwrap();
        assert_eq!(stored.plan, "enterprise");
    }

    #[test]
    fn reference_links_cross_source_key() {
        let store = MemoryStore::new();
        let stripe = resolve_customer(&store, SourceKind::Stripe, &reference("cus_1")).unwrap();

        let mut openai = reference("proj_1");
        openai.reference = Some(stripe.customer.id.to_string());
        let resolution = resolve_customer(&store, SourceKind::OpenAi, &openai).unwrap();
        assert!(!resolution.created);
        assert_eq!(resolution.customer.id, stripe.customer.id);

        // Later records from that key resolve without the reference.
        let again = resolve_customer(&store, SourceKind::OpenAi, &reference("proj_1")).unwrap();
        assert_eq!(again.customer.id, stripe.customer.id);
        assert_eq!(store.list_customers().unwrap().len(), 1);
    }

    #[test]
    fn unknown_reference_fails() {
        let store = MemoryStore::new();

        let mut dangling = reference("proj_1");
        dangling.reference = Some(CustomerId::generate().to_string());
        let result = resolve_customer(&store, SourceKind::OpenAi, &dangling);
        assert!(matches!(
            result,
            Err(MarginError::UnknownCustomerReference { .. })
        ));

        let mut garbage = reference("proj_1");
        garbage.reference = Some("not-a-uuid".into());
        assert!(resolve_customer(&store, SourceKind::OpenAi, &garbage).is_err());
        assert!(store.list_customers().unwrap().is_empty());
    }
}
