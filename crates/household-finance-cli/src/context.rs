use std::sync::Arc;

use household_finance_core::config::StoreConfig;
use household_finance_core::loans::LoanService;
use household_finance_core::netting::ExpenseService;
use household_finance_core::store::json_file::JsonFileStore;
use household_finance_core::store::lock::LockRegistry;
use household_finance_core::store::memory::MemoryStore;
use household_finance_core::store::TabularStore;

/// Services wired over one store. `--db -` keeps everything in memory,
/// anything else opens (or creates) the JSON file store at that path.
pub struct AppContext {
    pub loans: LoanService,
    pub expenses: ExpenseService,
}

impl AppContext {
    pub fn open(db: &str) -> Result<AppContext, Box<dyn std::error::Error>> {
        let store: Arc<dyn TabularStore> = if db.trim() == "-" {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(JsonFileStore::open(db)?)
        };
        let locks = Arc::new(LockRegistry::new());
        let config = StoreConfig::default();

        let loans = LoanService::new(store.clone(), locks.clone(), config.clone())?;
        let expenses = ExpenseService::new(store, locks, config)?;
        Ok(AppContext { loans, expenses })
    }
}
