//! Guide operations run directly against the database

use anyhow::Result;
use clap::Parser;
use dsenvios_core::{AppConfig, EventMetadata, NewShipment, Party, ShipmentStatus, TrackingNumber};
use dsenvios_server::db::repos::{GuideQuery, GuideRepo};
use dsenvios_server::projector::HistoryEntry;
use dsenvios_server::{Projection, StatusEngine, TrackingProjector};

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Tracking number (generated when omitted)
    #[arg(long)]
    pub numero: Option<String>,

    #[arg(long)]
    pub remitente: String,

    #[arg(long)]
    pub remitente_telefono: Option<String>,

    #[arg(long)]
    pub destinatario: String,

    #[arg(long)]
    pub destinatario_telefono: Option<String>,

    /// Service type (e.g. standard, express)
    #[arg(long, default_value = "standard")]
    pub tipo: String,

    /// Weight in kilograms
    #[arg(long)]
    pub peso: f64,

    #[arg(long)]
    pub costo: f64,

    #[arg(long)]
    pub valor_declarado: Option<f64>,

    #[arg(long)]
    pub bodega_origen: Option<String>,

    #[arg(long)]
    pub bodega_destino: Option<String>,

    #[arg(long)]
    pub descripcion: Option<String>,

    /// Location for the first history entry
    #[arg(long)]
    pub ubicacion: Option<String>,

    /// Operator recorded on the first history entry
    #[arg(long, env = "USER")]
    pub usuario: Option<String>,

    /// Print JSON instead of a summary line
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct TransitionArgs {
    /// Tracking number
    pub numero: String,

    /// Target status (code like `in_transit` or label like `EN_TRANSITO`)
    pub estado: String,

    #[arg(long)]
    pub ubicacion: Option<String>,

    #[arg(long, env = "USER")]
    pub usuario: Option<String>,

    #[arg(long)]
    pub observaciones: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct TrackArgs {
    /// Tracking number
    pub numero: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Page size (capped at 100)
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// Sort column: numero_guia, created_at, tipo_envio, status, costo, peso
    #[arg(long)]
    pub sort_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    pub sort_order: Option<String>,

    /// Tracking number substring
    #[arg(long)]
    pub numero: Option<String>,

    #[arg(long)]
    pub tipo: Option<String>,

    #[arg(long)]
    pub estado: Option<String>,

    /// Created on or after (YYYY-MM-DD)
    #[arg(long)]
    pub desde: Option<String>,

    /// Created on or before (YYYY-MM-DD)
    #[arg(long)]
    pub hasta: Option<String>,

    #[arg(long)]
    pub json: bool,
}

impl TryFrom<CreateArgs> for NewShipment {
    type Error = anyhow::Error;

    fn try_from(args: CreateArgs) -> Result<Self> {
        let tracking_number = args.numero.as_deref().map(TrackingNumber::new).transpose()?;
        Ok(NewShipment {
            tracking_number,
            sender: Party {
                name: args.remitente,
                phone: args.remitente_telefono,
            },
            recipient: Party {
                name: args.destinatario,
                phone: args.destinatario_telefono,
            },
            origin_warehouse: args.bodega_origen,
            destination_warehouse: args.bodega_destino,
            service_type: args.tipo,
            weight_kg: args.peso,
            declared_value: args.valor_declarado,
            cost: args.costo,
            description: args.descripcion,
            notes: None,
            initial: EventMetadata {
                location: args.ubicacion,
                actor: args.usuario,
                notes: None,
            },
        })
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn history_line(entry: &HistoryEntry) -> String {
    format!(
        "{:>3}  {}  {:<28} {}",
        entry.seq,
        entry.fecha.format("%Y-%m-%d %H:%M:%S"),
        entry.estado_label,
        entry.ubicacion.as_deref().unwrap_or("-"),
    )
}

fn print_projection(projection: &Projection) {
    let guia = &projection.guia;
    println!(
        "{}  {}  {}%",
        guia.numero_guia, guia.estado_label, projection.progreso.porcentaje
    );
    println!("  {} -> {}", guia.remitente.name, guia.destinatario.name);
    for entry in &projection.historial {
        println!("  {}", history_line(entry));
    }
}

pub async fn run_create(args: CreateArgs, config: &AppConfig) -> Result<()> {
    let json = args.json;
    let new = NewShipment::try_from(args)?;

    let pool = super::connect(config).await?;
    let result = StatusEngine::new(&pool).create(new).await;
    pool.close().await;
    let shipment = result?;

    if json {
        print_json(&shipment)
    } else {
        println!("Created {} ({})", shipment.tracking_number, shipment.status.label());
        Ok(())
    }
}

pub async fn run_transition(args: TransitionArgs, config: &AppConfig) -> Result<()> {
    let tracking_number = TrackingNumber::new(&args.numero)?;
    let target: ShipmentStatus = args.estado.parse()?;
    let metadata = EventMetadata {
        location: args.ubicacion,
        actor: args.usuario,
        notes: args.observaciones,
    };

    let pool = super::connect(config).await?;
    let result = StatusEngine::new(&pool)
        .transition(&tracking_number, target, metadata)
        .await;
    pool.close().await;
    let entry = HistoryEntry::from(result?);

    if args.json {
        print_json(&entry)
    } else {
        println!("{}: {}", tracking_number, history_line(&entry));
        Ok(())
    }
}

pub async fn run_track(args: TrackArgs, config: &AppConfig) -> Result<()> {
    let tracking_number = TrackingNumber::new(&args.numero)?;

    let pool = super::connect(config).await?;
    let result = TrackingProjector::new(&pool).project(&tracking_number).await;
    pool.close().await;
    let projection = result?;

    if args.json {
        print_json(&projection)
    } else {
        print_projection(&projection);
        Ok(())
    }
}

pub async fn run_list(args: ListArgs, config: &AppConfig) -> Result<()> {
    let (filter, page) = GuideQuery {
        page: Some(args.page),
        limit: Some(args.limit),
        sort_by: args.sort_by,
        sort_order: args.sort_order,
        numero_guia: args.numero,
        tipo_envio: args.tipo,
        fecha_inicio: args.desde,
        fecha_fin: args.hasta,
        status: args.estado,
    }
    .into_parts()?;

    let pool = super::connect(config).await?;
    let result = GuideRepo::new(&pool).list(&filter, page).await;
    pool.close().await;
    let guides = result?;

    if args.json {
        return print_json(&guides);
    }

    for shipment in &guides.data {
        println!(
            "{:<16} {:<28} {:<10} {:>8.2} {}",
            shipment.tracking_number.as_str(),
            shipment.status.label(),
            shipment.service_type,
            shipment.cost,
            shipment.created_at.format("%Y-%m-%d"),
        );
    }
    println!("page {} of {} ({} guides)", guides.page, guides.total_pages, guides.total);
    Ok(())
}
