//! Read-only data sources: datacenters, images, locations and server types.
//!
//! Each lookup takes an id or a name. The id wins when both are given.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{ApiError, Result, ValidationError};
use crate::hcloud::{CloudApi, Datacenter, Image, Location, ServerType};
use crate::schema::{FieldFlags, FieldSchema, FieldType};

use super::parse_id;

const LOOKUP: FieldFlags = FieldFlags::OPTIONAL.union(FieldFlags::COMPUTED);
const COMPUTED: FieldFlags = FieldFlags::COMPUTED;

/// Field table of `hcloud_datacenter`.
pub const DATACENTER_SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("id", FieldType::Str, LOOKUP),
    FieldSchema::new("name", FieldType::Str, LOOKUP),
    FieldSchema::new("description", FieldType::Str, COMPUTED),
    FieldSchema::new("location", FieldType::Int, COMPUTED),
    FieldSchema::new("server_types_supported", FieldType::IntList, COMPUTED),
    FieldSchema::new("server_types_available", FieldType::IntList, COMPUTED),
];

/// Field table of `hcloud_image`.
pub const IMAGE_SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("id", FieldType::Str, LOOKUP),
    FieldSchema::new("name", FieldType::Str, LOOKUP),
    FieldSchema::new("description", FieldType::Str, COMPUTED),
    FieldSchema::new("status", FieldType::Str, COMPUTED),
];

/// Field table of `hcloud_location`.
pub const LOCATION_SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("id", FieldType::Str, LOOKUP),
    FieldSchema::new("name", FieldType::Str, LOOKUP),
    FieldSchema::new("description", FieldType::Str, COMPUTED),
    FieldSchema::new("country", FieldType::Str, COMPUTED),
    FieldSchema::new("city", FieldType::Str, COMPUTED),
];

/// Field table of `hcloud_server_type`.
pub const SERVER_TYPE_SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("id", FieldType::Str, LOOKUP),
    FieldSchema::new("name", FieldType::Str, LOOKUP),
    FieldSchema::new("description", FieldType::Str, COMPUTED),
    FieldSchema::new("cores", FieldType::Int, COMPUTED),
    FieldSchema::new("disk", FieldType::Int, COMPUTED),
];

/// Kind of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// Datacenter.
    Datacenter,
    /// Image.
    Image,
    /// Location.
    Location,
    /// Server type.
    ServerType,
}

/// Lookup keys of a data source read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceQuery {
    /// Numeric id as a string.
    #[serde(default)]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default)]
    pub name: Option<String>,
}

enum Lookup<'a> {
    Id(u64),
    Name(&'a str),
}

impl DataSourceQuery {
    /// Query by id.
    #[must_use]
    pub fn by_id(id: impl ToString) -> Self {
        Self {
            id: Some(id.to_string()),
            name: None,
        }
    }

    /// Query by name.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    fn lookup(&self, kind: DataSourceKind) -> Result<Lookup<'_>> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(Lookup::Id(parse_id(id)?));
        }
        if let Some(name) = self.name.as_deref().filter(|name| !name.is_empty()) {
            return Ok(Lookup::Name(name));
        }
        Err(ValidationError::MissingLookupKey {
            data_source: kind.to_string(),
        }
        .into())
    }
}

/// A datacenter read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterData {
    /// Datacenter id.
    pub id: u64,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Location id.
    pub location: u64,
    /// Server type ids supported here.
    pub server_types_supported: Vec<u64>,
    /// Server type ids currently available for creation.
    pub server_types_available: Vec<u64>,
}

/// An image read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Image id.
    pub id: u64,
    /// Name; absent for snapshots.
    pub name: Option<String>,
    /// Description.
    pub description: String,
    /// Status.
    pub status: String,
}

/// A location read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    /// Location id.
    pub id: u64,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Country code.
    pub country: String,
    /// City.
    pub city: String,
}

/// A server type read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTypeData {
    /// Server type id.
    pub id: u64,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Number of cores.
    pub cores: u32,
    /// Disk size in GB.
    pub disk: u64,
}

/// Result of any data source read.
///
/// Images and locations that do not exist read as `None` (an empty identity)
/// rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DataSourceResult {
    /// Datacenter.
    Datacenter(DatacenterData),
    /// Image, if found.
    Image(Option<ImageData>),
    /// Location, if found.
    Location(Option<LocationData>),
    /// Server type.
    ServerType(ServerTypeData),
}

impl DataSourceResult {
    /// Returns the identity of the object read, `None` if nothing matched.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Datacenter(dc) => Some(dc.id),
            Self::Image(image) => image.as_ref().map(|i| i.id),
            Self::Location(location) => location.as_ref().map(|l| l.id),
            Self::ServerType(st) => Some(st.id),
        }
    }
}

impl From<Datacenter> for DatacenterData {
    fn from(dc: Datacenter) -> Self {
        Self {
            id: dc.id,
            name: dc.name,
            description: dc.description,
            location: dc.location.id,
            server_types_supported: dc.server_types.supported,
            server_types_available: dc.server_types.available,
        }
    }
}

impl From<Image> for ImageData {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            name: image.name,
            description: image.description,
            status: image.status,
        }
    }
}

impl From<Location> for LocationData {
    fn from(location: Location) -> Self {
        Self {
            id: location.id,
            name: location.name,
            description: location.description,
            country: location.country,
            city: location.city,
        }
    }
}

impl From<ServerType> for ServerTypeData {
    fn from(st: ServerType) -> Self {
        Self {
            id: st.id,
            name: st.name,
            description: st.description,
            cores: st.cores,
            disk: st.disk,
        }
    }
}

fn lookup_label(lookup: &Lookup<'_>) -> String {
    match lookup {
        Lookup::Id(id) => id.to_string(),
        Lookup::Name(name) => (*name).to_string(),
    }
}

/// Reads a datacenter.
///
/// # Errors
///
/// Returns an error if the query has no key, the datacenter does not exist,
/// or the API call fails.
pub async fn read_datacenter<A: CloudApi + ?Sized>(
    api: &A,
    query: &DataSourceQuery,
) -> Result<DatacenterData> {
    let lookup = query.lookup(DataSourceKind::Datacenter)?;
    let found = match &lookup {
        Lookup::Id(id) => api.get_datacenter(*id).await?,
        Lookup::Name(name) => api.get_datacenter_by_name(name).await?,
    };
    found
        .map(Into::into)
        .ok_or_else(|| ApiError::not_found("datacenter", lookup_label(&lookup)).into())
}

/// Reads an image. A missing image yields `None`.
///
/// # Errors
///
/// Returns an error if the query has no key or the API call fails.
pub async fn read_image<A: CloudApi + ?Sized>(
    api: &A,
    query: &DataSourceQuery,
) -> Result<Option<ImageData>> {
    let lookup = query.lookup(DataSourceKind::Image)?;
    let found = match &lookup {
        Lookup::Id(id) => api.get_image(*id).await?,
        Lookup::Name(name) => api.get_image_by_name(name).await?,
    };
    if found.is_none() {
        debug!("Image {} not found", lookup_label(&lookup));
    }
    Ok(found.map(Into::into))
}

/// Reads a location. A missing location yields `None`.
///
/// # Errors
///
/// Returns an error if the query has no key or the API call fails.
pub async fn read_location<A: CloudApi + ?Sized>(
    api: &A,
    query: &DataSourceQuery,
) -> Result<Option<LocationData>> {
    let lookup = query.lookup(DataSourceKind::Location)?;
    let found = match &lookup {
        Lookup::Id(id) => api.get_location(*id).await?,
        Lookup::Name(name) => api.get_location_by_name(name).await?,
    };
    if found.is_none() {
        debug!("Location {} not found", lookup_label(&lookup));
    }
    Ok(found.map(Into::into))
}

/// Reads a server type.
///
/// # Errors
///
/// Returns an error if the query has no key, the server type does not exist,
/// or the API call fails.
pub async fn read_server_type<A: CloudApi + ?Sized>(
    api: &A,
    query: &DataSourceQuery,
) -> Result<ServerTypeData> {
    let lookup = query.lookup(DataSourceKind::ServerType)?;
    let found = match &lookup {
        Lookup::Id(id) => api.get_server_type(*id).await?,
        Lookup::Name(name) => api.get_server_type_by_name(name).await?,
    };
    found
        .map(Into::into)
        .ok_or_else(|| ApiError::not_found("server_type", lookup_label(&lookup)).into())
}

/// Reads any data source.
///
/// # Errors
///
/// See the per-kind readers.
pub async fn read<A: CloudApi + ?Sized>(
    api: &A,
    kind: DataSourceKind,
    query: &DataSourceQuery,
) -> Result<DataSourceResult> {
    Ok(match kind {
        DataSourceKind::Datacenter => DataSourceResult::Datacenter(read_datacenter(api, query).await?),
        DataSourceKind::Image => DataSourceResult::Image(read_image(api, query).await?),
        DataSourceKind::Location => DataSourceResult::Location(read_location(api, query).await?),
        DataSourceKind::ServerType => {
            DataSourceResult::ServerType(read_server_type(api, query).await?)
        }
    })
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Datacenter => "hcloud_datacenter",
            Self::Image => "hcloud_image",
            Self::Location => "hcloud_location",
            Self::ServerType => "hcloud_server_type",
        };
        write!(f, "{name}")
    }
}
