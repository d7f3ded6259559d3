//! Device registry and selection
//!
//! This module turns a device string into a [`DeviceSelection`], merges the
//! enumerations of every compiled-in family, and provides the
//! [`HardwareConnector`] the sampler uses to discover and open devices.

use std::collections::HashMap;

use rngcap_core::{Connector, DeviceDescriptor, EntropySource, Error, Result, TransportKind};

#[cfg(feature = "bitbabbler")]
use rngcap_bitbabbler::{BitBabbler, BitBabblerConfig};
#[cfg(feature = "truerng")]
use rngcap_truerng::{CaptureMode, TrueRng, TrueRngConfig};

/// Parsed device parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams {
    /// Device family name as written
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

/// Parse a device string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
///
/// # Example
/// ```
/// use rngcap_acquire::parse_device_params;
///
/// let params = parse_device_params("truerng:mode=normal,knock=1")?;
/// assert_eq!(params.name, "truerng");
/// assert_eq!(params.params.get("mode"), Some(&"normal".to_string()));
/// # Ok::<(), rngcap_core::Error>(())
/// ```
pub fn parse_device_params(s: &str) -> Result<DeviceParams> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.trim().to_string(), value.trim().to_string());
            } else {
                return Err(Error::InvalidArgument(format!(
                    "Invalid parameter format: '{}' (expected key=value)",
                    opt
                )));
            }
        }
    }

    Ok(DeviceParams {
        name: name.trim().to_lowercase(),
        params,
    })
}

/// Device family a selection is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    /// First device of any supported family
    #[default]
    Any,
    /// TrueRNG family only
    TrueRng,
    /// BitBabbler only
    BitBabbler,
}

/// Which device to use and how to set it up
#[derive(Debug, Clone, Default)]
pub struct DeviceSelection {
    /// Family restriction
    pub family: Family,
    /// Fixed system path; `None` takes the first match
    pub path: Option<String>,
    /// Options for TrueRNG sessions
    #[cfg(feature = "truerng")]
    pub truerng: TrueRngConfig,
    /// Options for BitBabbler sessions
    #[cfg(feature = "bitbabbler")]
    pub bitbabbler: BitBabblerConfig,
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "on" | "true" => Ok(true),
        "0" | "no" | "off" | "false" => Ok(false),
        _ => Err(Error::InvalidArgument(format!(
            "Invalid value '{}' for {} (expected 0/1)",
            value, key
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid value '{}' for {}", value, key)))
}

impl DeviceSelection {
    /// Any device, default options
    pub fn auto() -> Self {
        Self::default()
    }

    /// Parse a device string such as `truerng:mode=raw_bin,knock=1`
    ///
    /// Recognized names are `auto`, `truerng` and `bitbabbler`. Unknown
    /// keys are logged and ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let params = parse_device_params(s)?;
        let mut selection = Self::default();

        selection.family = match params.name.as_str() {
            "" | "auto" | "any" => Family::Any,
            "truerng" | "trng" => Family::TrueRng,
            "bitbabbler" | "bb" => Family::BitBabbler,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "Unknown device '{}'. Available: auto, {}",
                    other,
                    source_names_short()
                )))
            }
        };

        let mut keys: Vec<_> = params.params.iter().collect();
        keys.sort();
        for (key, value) in keys {
            selection.set_option(key, value)?;
        }
        Ok(selection)
    }

    /// Apply one `key=value` option
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "dev" | "path" | "port" => self.path = Some(value.to_string()),
            #[cfg(feature = "truerng")]
            "mode" => self.truerng.mode = value.parse::<CaptureMode>()?,
            #[cfg(feature = "truerng")]
            "knock" => self.truerng.knock = parse_bool(key, value)?,
            #[cfg(feature = "truerng")]
            "dtr" => self.truerng.dtr_pulse = parse_bool(key, value)?,
            #[cfg(feature = "truerng")]
            "poll" => {
                let ms: u64 = parse_num(key, value)?;
                self.truerng = self
                    .truerng
                    .clone()
                    .read_poll(std::time::Duration::from_millis(ms))?;
            }
            #[cfg(feature = "bitbabbler")]
            "bitrate" => {
                let bitrate = parse_num(key, value)?;
                self.bitbabbler = self.bitbabbler.clone().bitrate(bitrate)?;
            }
            #[cfg(feature = "bitbabbler")]
            "latency" => {
                let latency = parse_num(key, value)?;
                self.bitbabbler = self.bitbabbler.clone().latency_ms(latency)?;
            }
            #[cfg(feature = "bitbabbler")]
            "interface" => {
                let interface = parse_num(key, value)?;
                self.bitbabbler = self.bitbabbler.clone().interface(interface);
            }
            _ => log::warn!("Unknown device option: {}={}", key, value),
        }
        Ok(())
    }

    /// Set the TrueRNG capture mode
    #[cfg(feature = "truerng")]
    pub fn mode(mut self, mode: CaptureMode) -> Self {
        self.truerng.mode = mode;
        self
    }

    fn includes(&self, kind: TransportKind) -> bool {
        match self.family {
            Family::Any => true,
            Family::TrueRng => kind == TransportKind::Serial,
            Family::BitBabbler => kind == TransportKind::BulkUsb,
        }
    }
}

/// Information about a supported device family
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Families compiled into this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_sources() -> Vec<SourceInfo> {
    let mut sources = Vec::new();

    #[cfg(feature = "truerng")]
    sources.push(SourceInfo {
        name: "truerng",
        aliases: &["trng"],
        description: "TrueRNG / TrueRNGpro / TrueRNGproV2 serial (mode=<m>,knock=<0|1>,dev=<port>)",
    });

    #[cfg(feature = "bitbabbler")]
    sources.push(SourceInfo {
        name: "bitbabbler",
        aliases: &["bb"],
        description: "BitBabbler FTDI bulk USB (bitrate=<bps>,latency=<ms>,dev=usb:<bus>-<addr>)",
    });

    sources
}

/// Short list of family names for CLI help
pub fn source_names_short() -> String {
    let sources = available_sources();
    if sources.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = sources.iter().map(|s| s.name).collect();
    names.join(", ")
}

type Enumerator = fn() -> Result<Vec<DeviceDescriptor>>;

fn enumerators() -> Vec<(&'static str, Enumerator)> {
    #[allow(unused_mut)]
    let mut list: Vec<(&'static str, Enumerator)> = Vec::new();
    #[cfg(feature = "truerng")]
    list.push(("TrueRNG", rngcap_truerng::list_devices));
    #[cfg(feature = "bitbabbler")]
    list.push(("BitBabbler", rngcap_bitbabbler::list_devices));
    list
}

/// Merge the results of several family enumerations
///
/// A family whose enumeration fails is skipped with a warning; the call
/// only fails when every family failed.
fn merge_enumerations(
    results: Vec<(&'static str, Result<Vec<DeviceDescriptor>>)>,
) -> Result<Vec<DeviceDescriptor>> {
    let mut devices = Vec::new();
    let mut last_error = None;
    let mut any_ok = results.is_empty();

    for (family, result) in results {
        match result {
            Ok(found) => {
                any_ok = true;
                devices.extend(found);
            }
            Err(e) => {
                log::warn!("{} enumeration failed: {}", family, e);
                last_error = Some(e);
            }
        }
    }

    match (any_ok, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(devices),
    }
}

/// List every connected device of every compiled-in family
///
/// Enumeration is redone on each call; nothing is cached.
pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
    let results = enumerators()
        .into_iter()
        .map(|(family, enumerate)| (family, enumerate()))
        .collect();
    merge_enumerations(results)
}

/// Whether at least one supported device is connected
pub fn detect_presence() -> Result<bool> {
    Ok(!list_devices()?.is_empty())
}

/// Pick the device `selection` refers to out of `devices`
fn select(
    selection: &DeviceSelection,
    devices: Vec<DeviceDescriptor>,
) -> Result<DeviceDescriptor> {
    devices
        .into_iter()
        .filter(|d| selection.includes(d.kind))
        .find(|d| selection.path.as_deref().map_or(true, |p| d.path == p))
        .ok_or(Error::DeviceNotFound)
}

/// Find the first device matching `selection`
pub fn find_first(selection: &DeviceSelection) -> Result<DeviceDescriptor> {
    select(selection, list_devices()?)
}

/// Connector over real hardware
///
/// Discovery re-enumerates every time, so a device that came back on a new
/// path after a disconnect is picked up.
#[derive(Debug, Clone, Default)]
pub struct HardwareConnector {
    selection: DeviceSelection,
}

impl HardwareConnector {
    /// Connector for `selection`
    pub fn new(selection: DeviceSelection) -> Self {
        Self { selection }
    }

    /// The selection this connector resolves
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }
}

impl Connector for HardwareConnector {
    type Source = Box<dyn EntropySource>;

    fn discover(&mut self) -> Result<DeviceDescriptor> {
        find_first(&self.selection)
    }

    #[allow(unused_variables)]
    fn open(&mut self, device: &DeviceDescriptor, long_lived: bool) -> Result<Self::Source> {
        match device.kind {
            #[cfg(feature = "truerng")]
            TransportKind::Serial => {
                let trng = TrueRng::open_device(device, &self.selection.truerng, long_lived)?;
                Ok(Box::new(trng))
            }
            #[cfg(feature = "bitbabbler")]
            TransportKind::BulkUsb => {
                let bb = BitBabbler::open_device(device, &self.selection.bitbabbler)?;
                Ok(Box::new(bb))
            }
            #[allow(unreachable_patterns)]
            kind => Err(Error::InvalidArgument(format!(
                "{} devices are not supported by this build",
                kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rngcap_core::DeviceModel;

    fn desc(kind: TransportKind, model: DeviceModel, path: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            kind,
            model,
            path: path.to_string(),
            vendor_id: 0x04D8,
            product_id: 0xF5FE,
            display_name: model.name().to_string(),
            serial_number: None,
        }
    }

    #[test]
    fn test_parse_device_params() {
        let params = parse_device_params("bitbabbler:bitrate=2500000,latency=1").unwrap();
        assert_eq!(params.name, "bitbabbler");
        assert_eq!(params.params.len(), 2);
        assert_eq!(params.params.get("latency"), Some(&"1".to_string()));

        let params = parse_device_params("auto").unwrap();
        assert_eq!(params.name, "auto");
        assert!(params.params.is_empty());
    }

    #[test]
    fn test_parse_device_params_malformed() {
        let err = parse_device_params("truerng:knock").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_selection_parse_family() {
        assert_eq!(DeviceSelection::parse("auto").unwrap().family, Family::Any);
        assert_eq!(DeviceSelection::parse("").unwrap().family, Family::Any);
        assert_eq!(
            DeviceSelection::parse("TrueRNG").unwrap().family,
            Family::TrueRng
        );
        assert_eq!(
            DeviceSelection::parse("bb:dev=usb:1-4").unwrap().path,
            Some("usb:1-4".to_string())
        );
        assert!(DeviceSelection::parse("onerng").is_err());
    }

    #[cfg(feature = "truerng")]
    #[test]
    fn test_selection_truerng_options() {
        let selection = DeviceSelection::parse("truerng:mode=raw_bin,knock=1,dtr=0").unwrap();
        assert_eq!(selection.truerng.mode, CaptureMode::RawBin);
        assert!(selection.truerng.knock);
        assert!(!selection.truerng.dtr_pulse);

        assert!(DeviceSelection::parse("truerng:mode=turbo").is_err());
        assert!(DeviceSelection::parse("truerng:knock=maybe").is_err());
    }

    #[cfg(feature = "bitbabbler")]
    #[test]
    fn test_selection_bitbabbler_options() {
        let selection = DeviceSelection::parse("bitbabbler:bitrate=5000000,latency=2").unwrap();
        assert_eq!(selection.bitbabbler.bitrate, 5_000_000);
        assert_eq!(selection.bitbabbler.latency_ms, 2);
        assert!(DeviceSelection::parse("bitbabbler:bitrate=0").is_err());
        assert!(DeviceSelection::parse("bitbabbler:bitrate=fast").is_err());
    }

    #[test]
    fn test_select_filters_family_and_path() {
        let devices = vec![
            desc(TransportKind::Serial, DeviceModel::TrueRng, "/dev/ttyACM0"),
            desc(TransportKind::BulkUsb, DeviceModel::BitBabbler, "usb:1-4"),
            desc(TransportKind::Serial, DeviceModel::TrueRngProV2, "/dev/ttyACM1"),
        ];

        let any = DeviceSelection::auto();
        assert_eq!(select(&any, devices.clone()).unwrap().path, "/dev/ttyACM0");

        let bb = DeviceSelection::parse("bitbabbler").unwrap();
        assert_eq!(select(&bb, devices.clone()).unwrap().path, "usb:1-4");

        let pinned = DeviceSelection::parse("truerng:dev=/dev/ttyACM1").unwrap();
        assert_eq!(
            select(&pinned, devices.clone()).unwrap().model,
            DeviceModel::TrueRngProV2
        );

        let missing = DeviceSelection::parse("truerng:dev=/dev/ttyACM7").unwrap();
        assert_eq!(select(&missing, devices), Err(Error::DeviceNotFound));
    }

    #[test]
    fn test_merge_enumerations() {
        let ok = vec![desc(TransportKind::Serial, DeviceModel::TrueRng, "/dev/ttyACM0")];
        let merged = merge_enumerations(vec![
            ("TrueRNG", Ok(ok.clone())),
            ("BitBabbler", Err(Error::Enumeration("no usbfs".into()))),
        ])
        .unwrap();
        assert_eq!(merged, ok);

        let err = merge_enumerations(vec![(
            "BitBabbler",
            Err(Error::Enumeration("no usbfs".into())),
        )])
        .unwrap_err();
        assert_eq!(err, Error::Enumeration("no usbfs".into()));

        assert_eq!(merge_enumerations(Vec::new()), Ok(Vec::new()));
    }

    #[test]
    fn test_source_names() {
        let names = source_names_short();
        #[cfg(feature = "truerng")]
        assert!(names.contains("truerng"));
        #[cfg(feature = "bitbabbler")]
        assert!(names.contains("bitbabbler"));
    }
}
