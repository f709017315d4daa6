//! Typed payloads for the structured job kinds.
//!
//! The daemon accepts these as the `data` object of a `config`, `template`
//! or `ticket` job. Field names on the wire follow the daemon's schema.
//! The client core never inspects payloads; these types exist so callers
//! can build them without hand-writing JSON.

use crate::message::{MessageKind, OutboundMessage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Printer selection sent with a `config` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Printer name as known to the daemon host.
    pub printer: String,
    /// Ask the daemon to log debug output.
    #[serde(default)]
    pub debug_log: bool,
}

impl PrinterConfig {
    pub fn new(printer: impl Into<String>) -> Self {
        Self {
            printer: printer.into(),
            debug_log: false,
        }
    }

    pub fn with_debug_log(mut self, enabled: bool) -> Self {
        self.debug_log = enabled;
        self
    }
}

/// Layout template sent with a `template` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketTemplate {
    /// Ticket width in characters.
    pub ticket_width: u32,
    #[serde(rename = "razon_social_size")]
    pub business_name_size: u32,
    #[serde(rename = "datos_size")]
    pub data_size: u32,
    pub logo_width: u32,

    #[serde(rename = "ver_logotipo")]
    pub show_logo: bool,
    #[serde(rename = "ver_nombre")]
    pub show_name: bool,
    #[serde(rename = "ver_nombre_c")]
    pub show_trade_name: bool,
    #[serde(rename = "ver_rfc")]
    pub show_tax_id: bool,
    #[serde(rename = "ver_dom")]
    pub show_address: bool,
    #[serde(rename = "ver_leyenda")]
    pub show_legend: bool,
    #[serde(rename = "ver_regimen")]
    pub show_tax_regime: bool,
    #[serde(rename = "ver_email")]
    pub show_email: bool,
    #[serde(rename = "ver_telefono")]
    pub show_phone: bool,
    #[serde(rename = "ver_nombre_cliente")]
    pub show_customer_name: bool,
    #[serde(rename = "ver_folio")]
    pub show_folio: bool,
    #[serde(rename = "ver_fecha")]
    pub show_date: bool,
    #[serde(rename = "ver_tienda")]
    pub show_store: bool,
    #[serde(rename = "ver_precio_u")]
    pub show_unit_price: bool,
    #[serde(rename = "ver_cant_productos")]
    pub show_product_count: bool,
    #[serde(rename = "incluye_impuestos")]
    pub taxes_included: bool,
    #[serde(rename = "ver_impuestos")]
    pub show_taxes: bool,
    #[serde(rename = "ver_impuestos_total")]
    pub show_tax_total: bool,
    #[serde(rename = "ver_series")]
    pub show_serials: bool,

    #[serde(rename = "cambiar_cabecera")]
    pub header_text: String,
    #[serde(rename = "cambiar_reclamacion")]
    pub claims_text: String,
    #[serde(rename = "cambiar_pie")]
    pub footer_text: String,
}

impl Default for TicketTemplate {
    fn default() -> Self {
        Self {
            ticket_width: 42,
            business_name_size: 1,
            data_size: 1,
            logo_width: 200,
            show_logo: true,
            show_name: true,
            show_trade_name: true,
            show_tax_id: true,
            show_address: true,
            show_legend: true,
            show_tax_regime: true,
            show_email: true,
            show_phone: true,
            show_customer_name: true,
            show_folio: true,
            show_date: true,
            show_store: true,
            show_unit_price: true,
            show_product_count: true,
            taxes_included: true,
            show_taxes: true,
            show_tax_total: true,
            show_serials: true,
            header_text: String::new(),
            claims_text: String::new(),
            footer_text: String::new(),
        }
    }
}

/// Tax line, either per concept or global to the ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tax {
    pub factor: String,
    pub base: f64,
    #[serde(rename = "importe")]
    pub amount: f64,
    #[serde(rename = "impuestos")]
    pub code: String,
    #[serde(rename = "tasa")]
    pub rate: f64,
    #[serde(rename = "tipo")]
    pub kind: String,
}

/// Product or service line on a ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concept {
    #[serde(rename = "clave")]
    pub key: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "cantidad")]
    pub quantity: f64,
    #[serde(rename = "unidad")]
    pub unit: String,
    #[serde(rename = "precio_venta")]
    pub unit_price: f64,
    pub total: f64,
    #[serde(rename = "impuestos")]
    pub taxes: Vec<Tax>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<String>,
}

/// Payment method applied to a ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    #[serde(rename = "forma_pago")]
    pub method: String,
    #[serde(rename = "cantidad")]
    pub amount: f64,
    #[serde(rename = "forma_pago_identificador")]
    pub identifier: String,
}

/// Sale ticket sent with a `ticket` job.
///
/// Only the fields the daemon prints are modelled; anything else the caller
/// sets is kept in `extra` and sent along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ticket {
    #[serde(rename = "identificador")]
    pub id: String,
    #[serde(rename = "vendedor")]
    pub seller: String,
    pub folio: String,
    #[serde(rename = "serie")]
    pub series: String,
    #[serde(rename = "fecha_sistema")]
    pub date: String,
    #[serde(rename = "tipo_operacion")]
    pub operation: String,
    #[serde(rename = "anulada")]
    pub voided: bool,

    #[serde(rename = "descuento")]
    pub discount: f64,
    pub total: f64,
    #[serde(rename = "saldo")]
    pub balance: f64,
    #[serde(rename = "pagado")]
    pub paid: f64,
    #[serde(rename = "cambio")]
    pub change: f64,

    #[serde(rename = "cliente")]
    pub customer: String,
    #[serde(rename = "cliente_rfc")]
    pub customer_tax_id: String,
    #[serde(rename = "cliente_cp")]
    pub customer_postal_code: String,
    #[serde(rename = "cliente_emails")]
    pub customer_email: String,

    #[serde(rename = "sucursal_nombre")]
    pub branch_name: String,
    #[serde(rename = "sucursal_nombre_comercial")]
    pub branch_trade_name: String,
    #[serde(rename = "sucursal_rfc")]
    pub branch_tax_id: String,
    #[serde(rename = "sucursal_tienda")]
    pub branch_store: String,
    #[serde(rename = "sucursal_telefono")]
    pub branch_phone: String,
    #[serde(rename = "sucursal_email")]
    pub branch_email: String,
    #[serde(rename = "sucursal_leyenda_1")]
    pub legend_1: String,
    #[serde(rename = "sucursal_leyenda_2")]
    pub legend_2: String,

    #[serde(rename = "autofactura_link")]
    pub self_invoice_link: String,

    #[serde(rename = "conceptos")]
    pub concepts: Vec<Concept>,
    #[serde(rename = "pago")]
    pub payments: Vec<Payment>,
    #[serde(rename = "impuestos")]
    pub taxes: Vec<Tax>,

    #[serde(rename = "comentario", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ticket {
    /// Sum of line quantities.
    pub fn total_items(&self) -> f64 {
        self.concepts.iter().map(|c| c.quantity).sum()
    }

    /// Sum of all payments.
    pub fn paid_total(&self) -> f64 {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

/// Converts a typed payload into an outbound job.
pub trait ToJob: Serialize {
    const KIND: MessageKind;

    fn to_job(&self) -> Result<OutboundMessage, serde_json::Error> {
        Ok(OutboundMessage::new(Self::KIND, serde_json::to_value(self)?))
    }
}

impl ToJob for PrinterConfig {
    const KIND: MessageKind = MessageKind::Config;
}

impl ToJob for TicketTemplate {
    const KIND: MessageKind = MessageKind::Template;
}

impl ToJob for Ticket {
    const KIND: MessageKind = MessageKind::Ticket;
}
