use chrono::{DateTime, NaiveDate, Utc};
use common::events::{EventMessage, WalletEventType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::error::{TransferError, WalletError};
use crate::domain::types::{SagaId, WalletId};

/// Valida un monto de operacion: estrictamente positivo y con a lo sumo
/// dos decimales (la escala del balance).
///
/// # Examples
/// ```
/// use rust_decimal::Decimal;
/// use wallet_service::domain::entities::validate_amount;
///
/// assert!(validate_amount(Decimal::new(1050, 2)).is_ok());
/// assert!(validate_amount(Decimal::ZERO).is_err());
/// assert!(validate_amount(Decimal::new(10001, 3)).is_err());
/// ```
pub fn validate_amount(amount: Decimal) -> Result<Decimal, WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(WalletError::InvalidAmount(format!(
            "amount supports at most 2 decimal places, got {}",
            amount
        )));
    }
    Ok(amount)
}

fn validate_currency(currency: &str) -> Result<String, WalletError> {
    let currency = currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(WalletError::InvalidData(
            "La divisa debe ser un código ISO de 3 letras".into(),
        ));
    }
    Ok(currency)
}

/// Estado del ciclo de vida de una billetera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
}

/// Modelo de Entidad: Wallet.
///
/// Mantiene el balance por cuenta con escala fija de 2 decimales y aplica
/// las reglas de negocio de cada mutación. Las invariantes (`balance >= 0`,
/// límite diario, transiciones de estado) viven aquí; la capa de
/// persistencia solo se ocupa de cargar, bloquear y guardar.
///
/// # Examples
/// ```
/// use rust_decimal::Decimal;
/// use wallet_service::domain::entities::Wallet;
/// use wallet_service::domain::types::WalletId;
///
/// let mut wallet = Wallet::open(WalletId::new("alice"), "USD").unwrap();
/// wallet.deposit(Decimal::new(10000, 2)).unwrap();
/// assert_eq!(wallet.balance(), Decimal::new(10000, 2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    id: WalletId,
    balance: Decimal,
    currency: String,
    status: WalletStatus,
    daily_withdrawal_limit: Option<Decimal>,
    daily_withdrawal_total: Decimal,
    last_withdrawal_date: Option<NaiveDate>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Abre una billetera nueva con balance 0 en estado ACTIVE.
    pub fn open(id: WalletId, currency: &str) -> Result<Self, WalletError> {
        if id.as_str().trim().is_empty() {
            return Err(WalletError::InvalidData(
                "El identificador de la wallet no puede estar en blanco".into(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            balance: Decimal::ZERO,
            currency: validate_currency(currency)?,
            status: WalletStatus::Active,
            daily_withdrawal_limit: None,
            daily_withdrawal_total: Decimal::ZERO,
            last_withdrawal_date: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstruye la entidad desde los datos persistidos.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: WalletId,
        balance: Decimal,
        currency: String,
        status: WalletStatus,
        daily_withdrawal_limit: Option<Decimal>,
        daily_withdrawal_total: Decimal,
        last_withdrawal_date: Option<NaiveDate>,
        version: i32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            balance,
            currency,
            status,
            daily_withdrawal_limit,
            daily_withdrawal_total,
            last_withdrawal_date,
            version,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> WalletStatus {
        self.status
    }

    pub fn daily_withdrawal_limit(&self) -> Option<Decimal> {
        self.daily_withdrawal_limit
    }

    pub fn daily_withdrawal_total(&self) -> Decimal {
        self.daily_withdrawal_total
    }

    pub fn last_withdrawal_date(&self) -> Option<NaiveDate> {
        self.last_withdrawal_date
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Aplica un depósito. El monto ya debe venir validado.
    ///
    /// Los depósitos no exigen estado ACTIVE: una billetera congelada puede
    /// seguir recibiendo fondos.
    pub fn deposit(&mut self, amount: Decimal) -> Result<(), WalletError> {
        let amount = validate_amount(amount)?;
        self.balance += amount;
        self.touch();
        Ok(())
    }

    /// Aplica un retiro con chequeo de estado, límite diario y fondos.
    ///
    /// El acumulado diario se reinicia en el primer retiro de una nueva
    /// fecha calendario (UTC).
    pub fn withdraw(&mut self, amount: Decimal, today: NaiveDate) -> Result<(), WalletError> {
        let amount = validate_amount(amount)?;

        if self.status != WalletStatus::Active {
            return Err(WalletError::WalletNotActive(self.id.clone()));
        }

        if self.last_withdrawal_date.map_or(true, |d| d < today) {
            self.daily_withdrawal_total = Decimal::ZERO;
        }

        if let Some(limit) = self.daily_withdrawal_limit {
            if self.daily_withdrawal_total + amount > limit {
                return Err(WalletError::WithdrawalLimitExceeded(self.id.clone()));
            }
        }

        if self.balance < amount {
            return Err(WalletError::InsufficientFunds(self.id.clone()));
        }

        self.balance -= amount;
        self.daily_withdrawal_total += amount;
        self.last_withdrawal_date = Some(today);
        self.touch();
        Ok(())
    }

    /// Acredita fondos (leg de crédito o refund de compensación).
    ///
    /// El camino normal exige ACTIVE. El camino privilegiado (compensación)
    /// acepta FROZEN; una billetera CLOSED nunca recibe créditos.
    pub fn credit(&mut self, amount: Decimal, privileged: bool) -> Result<(), WalletError> {
        let amount = validate_amount(amount)?;
        match self.status {
            WalletStatus::Active => {}
            WalletStatus::Frozen if privileged => {}
            WalletStatus::Frozen => return Err(WalletError::WalletNotActive(self.id.clone())),
            WalletStatus::Closed => return Err(WalletError::WalletClosed(self.id.clone())),
        }
        self.balance += amount;
        self.touch();
        Ok(())
    }

    /// Congela la billetera. Retorna `false` si ya estaba congelada (no-op).
    pub fn freeze(&mut self) -> Result<bool, WalletError> {
        match self.status {
            WalletStatus::Closed => Err(WalletError::WalletClosed(self.id.clone())),
            WalletStatus::Frozen => Ok(false),
            WalletStatus::Active => {
                self.status = WalletStatus::Frozen;
                self.touch();
                Ok(true)
            }
        }
    }

    /// Descongela la billetera. Desde ACTIVE es un no-op (`false`).
    pub fn unfreeze(&mut self) -> Result<bool, WalletError> {
        match self.status {
            WalletStatus::Closed => Err(WalletError::WalletClosed(self.id.clone())),
            WalletStatus::Active => Ok(false),
            WalletStatus::Frozen => {
                self.status = WalletStatus::Active;
                self.touch();
                Ok(true)
            }
        }
    }

    /// Cierra la billetera. Exige balance exactamente 0.
    pub fn close(&mut self) -> Result<bool, WalletError> {
        if self.status == WalletStatus::Closed {
            return Ok(false);
        }
        if !self.balance.is_zero() {
            return Err(WalletError::NonZeroBalance(self.id.clone()));
        }
        self.status = WalletStatus::Closed;
        self.touch();
        Ok(true)
    }

    /// Fija o remueve el límite diario de retiro. `Some` debe ser positivo.
    pub fn set_daily_limit(&mut self, limit: Option<Decimal>) -> Result<(), WalletError> {
        if let Some(limit) = limit {
            if limit <= Decimal::ZERO {
                return Err(WalletError::InvalidAmount(format!(
                    "daily withdrawal limit must be positive, got {}",
                    limit
                )));
            }
        }
        if self.status == WalletStatus::Closed {
            return Err(WalletError::WalletClosed(self.id.clone()));
        }
        self.daily_withdrawal_limit = limit;
        self.touch();
        Ok(())
    }
}

/// Estado de la saga de transferencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_saga_state", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferSagaState {
    Pending,
    Debited,
    Completed,
    Compensated,
    Failed,
}

impl TransferSagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferSagaState::Pending => "PENDING",
            TransferSagaState::Debited => "DEBITED",
            TransferSagaState::Completed => "COMPLETED",
            TransferSagaState::Compensated => "COMPENSATED",
            TransferSagaState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferSagaState::Completed | TransferSagaState::Failed)
    }

    /// Grafo de transiciones legales. Cualquier otra arista es un error de
    /// programación y debe fallar ruidosamente.
    pub fn can_transition_to(&self, next: TransferSagaState) -> bool {
        use TransferSagaState::*;
        matches!(
            (self, next),
            (Pending, Debited)
                | (Pending, Failed)
                | (Debited, Completed)
                | (Debited, Compensated)
                | (Compensated, Failed)
        )
    }
}

/// Modelo de Entidad: TransferSaga.
///
/// Máquina de estados persistida que coordina una transferencia de dos
/// piernas (débito en origen, crédito en destino) con compensación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSaga {
    id: SagaId,
    from_wallet_id: WalletId,
    to_wallet_id: WalletId,
    amount: Decimal,
    currency: String,
    state: TransferSagaState,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransferSaga {
    pub fn new(
        from_wallet_id: WalletId,
        to_wallet_id: WalletId,
        amount: Decimal,
        currency: String,
    ) -> Result<Self, TransferError> {
        if from_wallet_id == to_wallet_id {
            return Err(TransferError::SameWallet(from_wallet_id));
        }
        let amount = validate_amount(amount)?;
        let now = Utc::now();
        Ok(Self {
            id: SagaId::new(),
            from_wallet_id,
            to_wallet_id,
            amount,
            currency,
            state: TransferSagaState::Pending,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: SagaId,
        from_wallet_id: WalletId,
        to_wallet_id: WalletId,
        amount: Decimal,
        currency: String,
        state: TransferSagaState,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from_wallet_id,
            to_wallet_id,
            amount,
            currency,
            state,
            metadata,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn from_wallet_id(&self) -> &WalletId {
        &self.from_wallet_id
    }

    pub fn to_wallet_id(&self) -> &WalletId {
        &self.to_wallet_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn state(&self) -> TransferSagaState {
        self.state
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Aplica una transición validando el grafo declarado.
    pub fn transition(&mut self, next: TransferSagaState) -> Result<(), TransferError> {
        if !self.state.can_transition_to(next) {
            return Err(TransferError::IllegalTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Anota una razón (compensación o fallo) en la metadata de la saga.
    pub fn record_reason(&mut self, key: &str, reason: &str) {
        if let serde_json::Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), serde_json::Value::String(reason.to_string()));
        } else {
            self.metadata = serde_json::json!({ key: reason });
        }
    }
}

/// Evento del journal tal como se lee de la base de datos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEvent {
    pub id: i64,
    pub wallet_id: WalletId,
    pub event_type: WalletEventType,
    pub currency: String,
    pub amount: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Evento nuevo a insertar en el journal (el `id` lo asigna la secuencia).
#[derive(Debug, Clone)]
pub struct NewWalletEvent {
    pub wallet_id: WalletId,
    pub event_type: WalletEventType,
    pub currency: String,
    pub amount: Option<Decimal>,
    pub metadata: serde_json::Value,
}

impl NewWalletEvent {
    pub fn new(
        wallet_id: WalletId,
        event_type: WalletEventType,
        currency: &str,
        amount: Option<Decimal>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            wallet_id,
            event_type,
            currency: currency.to_string(),
            amount,
            metadata,
        }
    }
}

/// Fila nueva del outbox, lista para persistir junto al cambio de negocio.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: WalletEventType,
    pub payload: EventMessage,
}

impl NewOutboxEvent {
    /// Construye la fila de outbox espejo de un evento del journal.
    pub fn mirror(event: &NewWalletEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.wallet_id.to_string(),
            event_type: event.event_type,
            payload: EventMessage {
                event_type: event.event_type,
                wallet_id: event.wallet_id.to_string(),
                amount: event.amount,
                metadata: event.metadata.clone(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// Fila del outbox como la ve el relay.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published: bool,
}

impl OutboxRow {
    /// Subject al que el relay publica esta fila.
    pub fn routing_key(&self) -> String {
        format!(
            "{}.{}",
            common::events::SUBJECT_PREFIX,
            self.event_type.to_lowercase()
        )
    }
}

/// Transiciones administrativas del ciclo de vida de una billetera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Freeze,
    Unfreeze,
    Close,
}

/// Resumen de billetera devuelto por las operaciones de balance.
///
/// Los montos salen como numeros JSON (escala 2, sin perdida en el rango
/// de balances soportado).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    #[schema(value_type = String)]
    pub wallet_id: WalletId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

/// Resumen devuelto por las operaciones administrativas.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    #[schema(value_type = String)]
    pub wallet_id: WalletId,
    #[schema(value_type = String)]
    pub status: WalletStatus,
}

/// Resumen devuelto al fijar o remover el limite diario.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitSummary {
    #[schema(value_type = String)]
    pub wallet_id: WalletId,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub daily_withdrawal_limit: Option<Decimal>,
}

/// Respuesta almacenada en el registro de idempotencia.
///
/// Se guarda exactamente lo que la capa HTTP respondió (código + cuerpo),
/// de modo que un replay devuelva la respuesta original sin re-ejecutar
/// efectos, incluso si la original fue un sobre de error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl StoredResponse {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self {
            status_code: 200,
            body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Resultado de una operación idempotente: ejecutada ahora o rehidratada
/// del registro de idempotencia.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Fresh(T),
    Replayed(StoredResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn active_wallet(balance: &str) -> Wallet {
        let mut wallet = Wallet::open(WalletId::new("w1"), "USD").unwrap();
        if balance != "0" {
            wallet.deposit(dec(balance)).unwrap();
        }
        wallet
    }

    #[rstest]
    #[case("0.01")]
    #[case("100")]
    #[case("99999999.99")]
    fn test_validate_amount_accepts_positive_scale_2(#[case] raw: &str) {
        assert!(validate_amount(dec(raw)).is_ok());
    }

    #[rstest]
    #[case("0")]
    #[case("-1")]
    #[case("0.001")]
    fn test_validate_amount_rejects_invalid(#[case] raw: &str) {
        assert!(matches!(
            validate_amount(dec(raw)),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_balance_tracks_deposits_and_withdrawals() {
        let mut wallet = active_wallet("0");
        let today = Utc::now().date_naive();

        wallet.deposit(dec("100")).unwrap();
        wallet.deposit(dec("50.25")).unwrap();
        wallet.withdraw(dec("30"), today).unwrap();

        // balance = suma de depositos - retiros exitosos
        assert_eq!(wallet.balance(), dec("120.25"));
        assert!(wallet.balance() >= Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_rejects_insufficient_funds_without_mutation() {
        let mut wallet = active_wallet("50");
        let today = Utc::now().date_naive();

        let result = wallet.withdraw(dec("50.01"), today);

        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));
        assert_eq!(wallet.balance(), dec("50"));
        assert_eq!(wallet.daily_withdrawal_total(), Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_requires_active_status() {
        let mut wallet = active_wallet("100");
        wallet.freeze().unwrap();

        let result = wallet.withdraw(dec("10"), Utc::now().date_naive());

        assert!(matches!(result, Err(WalletError::WalletNotActive(_))));
    }

    #[test]
    fn test_daily_limit_accumulates_within_same_day() {
        let mut wallet = active_wallet("1000");
        wallet.set_daily_limit(Some(dec("100"))).unwrap();
        let today = Utc::now().date_naive();

        wallet.withdraw(dec("60"), today).unwrap();
        wallet.withdraw(dec("40"), today).unwrap();

        // El acumulado llego exactamente al limite; un centavo mas falla.
        let result = wallet.withdraw(dec("0.01"), today);
        assert!(matches!(
            result,
            Err(WalletError::WithdrawalLimitExceeded(_))
        ));
        assert_eq!(wallet.daily_withdrawal_total(), dec("100"));
    }

    #[test]
    fn test_daily_limit_resets_on_new_utc_date() {
        let mut wallet = active_wallet("1000");
        wallet.set_daily_limit(Some(dec("100"))).unwrap();

        let yesterday = NaiveDate::from_ymd_opt(2026, 1, 14).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();

        wallet.withdraw(dec("100"), yesterday).unwrap();
        assert!(wallet.withdraw(dec("1"), yesterday).is_err());

        // Primer retiro del dia siguiente: el acumulado arranca de cero.
        wallet.withdraw(dec("100"), today).unwrap();
        assert_eq!(wallet.daily_withdrawal_total(), dec("100"));
        assert_eq!(wallet.last_withdrawal_date(), Some(today));
    }

    #[test]
    fn test_withdraw_without_limit_is_unbounded() {
        let mut wallet = active_wallet("100000");
        let today = Utc::now().date_naive();

        wallet.withdraw(dec("99999.99"), today).unwrap();
        assert_eq!(wallet.balance(), dec("0.01"));
    }

    #[test]
    fn test_credit_privileged_path_accepts_frozen() {
        let mut wallet = active_wallet("10");
        wallet.freeze().unwrap();

        assert!(matches!(
            wallet.credit(dec("5"), false),
            Err(WalletError::WalletNotActive(_))
        ));
        wallet.credit(dec("5"), true).unwrap();
        assert_eq!(wallet.balance(), dec("15"));
    }

    #[test]
    fn test_credit_never_reaches_closed_wallet() {
        let mut wallet = active_wallet("0");
        wallet.close().unwrap();

        assert!(matches!(
            wallet.credit(dec("5"), true),
            Err(WalletError::WalletClosed(_))
        ));
    }

    #[test]
    fn test_freeze_rejected_on_closed() {
        let mut wallet = active_wallet("0");
        wallet.close().unwrap();

        assert!(matches!(
            wallet.freeze(),
            Err(WalletError::WalletClosed(_))
        ));
    }

    #[test]
    fn test_unfreeze_from_active_is_noop() {
        let mut wallet = active_wallet("0");
        assert!(!wallet.unfreeze().unwrap());
        assert_eq!(wallet.status(), WalletStatus::Active);
    }

    #[test]
    fn test_close_requires_zero_balance() {
        let mut wallet = active_wallet("0.01");
        assert!(matches!(
            wallet.close(),
            Err(WalletError::NonZeroBalance(_))
        ));

        wallet
            .withdraw(dec("0.01"), Utc::now().date_naive())
            .unwrap();
        assert!(wallet.close().unwrap());
        assert_eq!(wallet.status(), WalletStatus::Closed);
    }

    #[test]
    fn test_set_daily_limit_must_be_positive() {
        let mut wallet = active_wallet("0");
        assert!(wallet.set_daily_limit(Some(dec("-5"))).is_err());
        assert!(wallet.set_daily_limit(Some(dec("0"))).is_err());
        wallet.set_daily_limit(Some(dec("500"))).unwrap();
        wallet.set_daily_limit(None).unwrap();
        assert_eq!(wallet.daily_withdrawal_limit(), None);
    }

    #[rstest]
    #[case(TransferSagaState::Pending, TransferSagaState::Debited, true)]
    #[case(TransferSagaState::Pending, TransferSagaState::Failed, true)]
    #[case(TransferSagaState::Debited, TransferSagaState::Completed, true)]
    #[case(TransferSagaState::Debited, TransferSagaState::Compensated, true)]
    #[case(TransferSagaState::Compensated, TransferSagaState::Failed, true)]
    #[case(TransferSagaState::Pending, TransferSagaState::Completed, false)]
    #[case(TransferSagaState::Pending, TransferSagaState::Compensated, false)]
    #[case(TransferSagaState::Debited, TransferSagaState::Failed, false)]
    #[case(TransferSagaState::Debited, TransferSagaState::Pending, false)]
    #[case(TransferSagaState::Completed, TransferSagaState::Failed, false)]
    #[case(TransferSagaState::Completed, TransferSagaState::Compensated, false)]
    #[case(TransferSagaState::Failed, TransferSagaState::Pending, false)]
    #[case(TransferSagaState::Compensated, TransferSagaState::Debited, false)]
    fn test_saga_transition_graph(
        #[case] from: TransferSagaState,
        #[case] to: TransferSagaState,
        #[case] legal: bool,
    ) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn test_saga_transition_fails_loud_on_illegal_edge() {
        let mut saga = TransferSaga::new(
            WalletId::new("a"),
            WalletId::new("b"),
            dec("10"),
            "USD".to_string(),
        )
        .unwrap();

        let result = saga.transition(TransferSagaState::Completed);

        assert!(matches!(
            result,
            Err(TransferError::IllegalTransition { .. })
        ));
        // El estado no cambia cuando la transicion es ilegal.
        assert_eq!(saga.state(), TransferSagaState::Pending);
    }

    #[test]
    fn test_saga_rejects_self_transfer() {
        let result = TransferSaga::new(
            WalletId::new("a"),
            WalletId::new("a"),
            dec("10"),
            "USD".to_string(),
        );
        assert!(matches!(result, Err(TransferError::SameWallet(_))));
    }

    #[test]
    fn test_saga_records_reason_in_metadata() {
        let mut saga = TransferSaga::new(
            WalletId::new("a"),
            WalletId::new("b"),
            dec("10"),
            "USD".to_string(),
        )
        .unwrap();

        saga.record_reason("failureReason", "credit leg failed");
        assert_eq!(saga.metadata()["failureReason"], "credit leg failed");
    }

    #[test]
    fn test_outbox_mirror_carries_event_payload() {
        let event = NewWalletEvent::new(
            WalletId::new("alice"),
            WalletEventType::FundsDeposited,
            "USD",
            Some(dec("100")),
            serde_json::json!({"requestId": "r1"}),
        );

        let row = NewOutboxEvent::mirror(&event);

        assert_eq!(row.aggregate_id, "alice");
        assert_eq!(row.event_type, WalletEventType::FundsDeposited);
        assert_eq!(row.payload.wallet_id, "alice");
        assert_eq!(row.payload.amount, Some(dec("100")));
        assert_eq!(row.payload.routing_key(), "wallet.funds_deposited");
    }
}
