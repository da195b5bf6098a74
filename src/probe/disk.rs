//! Parsing of `df` output for the monitored volume.

/// Header plus the monitored volume's row of `df -h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub header: String,
    pub row: Option<String>,
    pub used_percent: Option<u8>,
}

fn is_volume_row(line: &str, volume: &str) -> bool {
    let columns: Vec<&str> = line.split_whitespace().collect();
    columns.first() == Some(&volume) || (columns.len() > 1 && columns.last() == Some(&volume))
}

/// Picks the row whose device (first column) or mount point (last column)
/// equals `volume`.
pub fn parse_df(output: &str, volume: &str) -> DiskUsage {
    let mut lines = output.lines();
    let header = lines.next().unwrap_or_default().to_string();
    let row = lines.find(|line| is_volume_row(line, volume)).map(str::to_string);
    let used_percent = row.as_deref().and_then(used_percent);
    DiskUsage {
        header,
        row,
        used_percent,
    }
}

/// First `NN%` column of a `df` row.
fn used_percent(row: &str) -> Option<u8> {
    row.split_whitespace()
        .find_map(|column| column.strip_suffix('%'))
        .and_then(|value| value.parse().ok())
}

/// Available space in GiB from `df -BG <volume>`.
pub fn parse_available_gib(output: &str, volume: &str) -> Option<u64> {
    let row = output
        .lines()
        .skip(1)
        .find(|line| is_volume_row(line, volume))
        .or_else(|| output.lines().nth(1))?;
    row.split_whitespace()
        .nth(3)?
        .trim_end_matches('G')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF_H: &str = "\
Filesystem      Size  Used Avail Use% Mounted on
udev            7.8G     0  7.8G   0% /dev
/dev/vda1        49G   12G   35G  26% /
/dev/vdb1       100G   10G   90G  10% /data
/dev/vdb        492G  419G   48G  90% /mnt";

    #[test]
    fn test_parse_df_by_device() {
        let usage = parse_df(DF_H, "/dev/vdb");
        assert_eq!(usage.header, "Filesystem      Size  Used Avail Use% Mounted on");
        assert_eq!(
            usage.row.as_deref(),
            Some("/dev/vdb        492G  419G   48G  90% /mnt")
        );
        assert_eq!(usage.used_percent, Some(90));
    }

    #[test]
    fn test_parse_df_by_mount_point() {
        let usage = parse_df(DF_H, "/data");
        assert_eq!(usage.used_percent, Some(10));
    }

    #[test]
    fn test_parse_df_missing_volume() {
        let usage = parse_df(DF_H, "/dev/vdc");
        assert_eq!(usage.row, None);
        assert_eq!(usage.used_percent, None);
    }

    #[test]
    fn test_parse_available_gib() {
        let output = "\
Filesystem     1G-blocks  Used Available Use% Mounted on
/dev/vdb            492G  474G       19G  97% /mnt";
        assert_eq!(parse_available_gib(output, "/dev/vdb"), Some(19));
        assert_eq!(parse_available_gib("garbage", "/dev/vdb"), None);
    }
}
