//! Ausgabegeraete: Auflistung fuer die Konfiguration und Auswahl per Name
//!
//! `ausgabegeraet` in der Konfiguration ist ein Teilname ohne Beachtung
//! der Gross-/Kleinschreibung. Passt kein Geraet, werden die vorhandenen
//! Namen geloggt.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Abtastraten, die fuer Sprache in Frage kommen
const SPRACH_RATEN: [u32; 5] = [16_000, 22_050, 24_000, 44_100, 48_000];

/// Ein Ausgabegeraet, wie es der Client anzeigt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub name: String,
    /// Unterstuetzte Sprach-Abtastraten, aufsteigend
    pub sample_rates: Vec<u32>,
    pub channels: u16,
    /// Standardgeraet des Hosts
    pub is_default: bool,
}

impl AudioDevice {
    /// Ob `suche` auf dieses Geraet passt
    pub fn matches(&self, suche: &str) -> bool {
        name_matches(&self.name, suche)
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} Kanaele", self.name, self.channels)?;
        if !self.sample_rates.is_empty() {
            let raten: Vec<String> = self.sample_rates.iter().map(u32::to_string).collect();
            write!(f, ", {} Hz", raten.join("/"))?;
        }
        f.write_str(")")?;
        if self.is_default {
            f.write_str(" [Standard]")?;
        }
        Ok(())
    }
}

/// Teilstring-Vergleich ohne Gross-/Kleinschreibung
pub fn name_matches(name: &str, suche: &str) -> bool {
    name.to_lowercase().contains(&suche.trim().to_lowercase())
}

/// Alle Ausgabegeraete des Standard-Hosts
pub fn list_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let standard = host.default_output_device().and_then(|d| d.name().ok());
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let result: Vec<AudioDevice> = devices
        .filter_map(|d| match describe(&d, standard.as_deref()) {
            Ok(ad) => Some(ad),
            Err(e) => {
                warn!("Ausgabegeraet nicht lesbar: {}", e);
                None
            }
        })
        .collect();
    debug!(anzahl = result.len(), "Ausgabegeraete gefunden");
    Ok(result)
}

/// Das Standard-Ausgabegeraet, falls vorhanden
pub fn default_output() -> Option<AudioDevice> {
    let device = cpal::default_host().default_output_device()?;
    let name = device.name().ok();
    describe(&device, name.as_deref()).ok()
}

/// cpal-Geraet fuer die Wiedergabe (None = Standard)
pub fn load_cpal_output_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    let Some(suche) = name.filter(|n| !n.trim().is_empty()) else {
        return host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet);
    };

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let mut gesehen = Vec::new();
    for device in devices {
        let Ok(dev_name) = device.name() else {
            continue;
        };
        if name_matches(&dev_name, suche) {
            debug!(geraet = %dev_name, "Ausgabegeraet gewaehlt");
            return Ok(device);
        }
        gesehen.push(dev_name);
    }

    warn!(suche, verfuegbar = ?gesehen, "Kein passendes Ausgabegeraet");
    Err(AudioError::GeraetNichtGefunden(suche.to_string()))
}

fn describe(device: &Device, standard: Option<&str>) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let mut sample_rates = Vec::new();
    let mut channels = 1u16;
    if let Ok(configs) = device.supported_output_configs() {
        for cfg in configs {
            for rate in rates_in_range(cfg.min_sample_rate().0, cfg.max_sample_rate().0) {
                if !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
            channels = channels.max(cfg.channels());
        }
    }
    sample_rates.sort_unstable();

    Ok(AudioDevice {
        is_default: standard == Some(name.as_str()),
        name,
        sample_rates,
        channels,
    })
}

fn rates_in_range(min: u32, max: u32) -> impl Iterator<Item = u32> {
    SPRACH_RATEN.into_iter().filter(move |r| (min..=max).contains(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geraet(name: &str) -> AudioDevice {
        AudioDevice {
            name: name.into(),
            sample_rates: vec![44_100, 48_000],
            channels: 2,
            is_default: false,
        }
    }

    #[test]
    fn teilname_ohne_gross_klein() {
        let g = geraet("USB Headset Analog Stereo");
        assert!(g.matches("headset"));
        assert!(g.matches(" USB "));
        assert!(!g.matches("HDMI"));
    }

    #[test]
    fn anzeige_mit_standard_markierung() {
        let mut g = geraet("Lautsprecher");
        assert_eq!(g.to_string(), "Lautsprecher (2 Kanaele, 44100/48000 Hz)");
        g.is_default = true;
        g.sample_rates.clear();
        assert_eq!(g.to_string(), "Lautsprecher (2 Kanaele) [Standard]");
    }

    #[test]
    fn raten_im_bereich() {
        let raten: Vec<u32> = rates_in_range(22_050, 44_100).collect();
        assert_eq!(raten, vec![22_050, 24_000, 44_100]);
        assert_eq!(rates_in_range(96_000, 192_000).count(), 0);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn ausgabegeraete_auflistbar() {
        let devices = list_output_devices().expect("Liste sollte abrufbar sein");
        assert!(devices.iter().filter(|d| d.is_default).count() <= 1);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn unbekanntes_geraet() {
        let result = load_cpal_output_device(Some("gibt-es-garantiert-nicht-4711"));
        assert!(matches!(result, Err(AudioError::GeraetNichtGefunden(_))));
    }
}
