use super::asio::sys::{ASE_OK, ASE_SUCCESS};

/// Format an ASIO driver status code into a human-readable string.
///
/// Known error codes are returned with their symbolic name; unknown codes
/// are formatted as hex.
pub fn ase_code(code: i32) -> String {
    match code {
        ASE_OK => "ASE_OK (0)".to_string(),
        ASE_SUCCESS => format!("ASE_SUCCESS ({ASE_SUCCESS:#X})"),
        -1000 => "ASE_NotPresent (-1000)".to_string(),
        -999 => "ASE_HWMalfunction (-999)".to_string(),
        -998 => "ASE_InvalidParameter (-998)".to_string(),
        -997 => "ASE_InvalidMode (-997)".to_string(),
        -996 => "ASE_SPNotAdvancing (-996)".to_string(),
        -995 => "ASE_NoClock (-995)".to_string(),
        -994 => "ASE_NoMemory (-994)".to_string(),
        other => format!("ASIOError {other} ({other:#X})"),
    }
}

/// Build an ASIO error string from an operation description and status code.
pub fn asio_error(operation: &str, code: i32) -> String {
    format!("ASIO {operation} failed: {}", ase_code(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_are_named() {
        assert_eq!(ase_code(-997), "ASE_InvalidMode (-997)");
        assert_eq!(ase_code(0), "ASE_OK (0)");
        assert_eq!(ase_code(0x3f4847a0), "ASE_SUCCESS (0x3F4847A0)");
    }

    #[test]
    fn unknown_codes_fall_back_to_hex() {
        assert_eq!(ase_code(-5), "ASIOError -5 (0xFFFFFFFB)");
        assert_eq!(
            asio_error("createBuffers", -994),
            "ASIO createBuffers failed: ASE_NoMemory (-994)"
        );
    }
}
