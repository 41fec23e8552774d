use super::convert::fill_silence;
use super::ring::PlaneReader;
use super::sample::SampleType;
use super::slot;
use super::sys::{AsioTime, Callbacks};
use std::os::raw::c_void;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback table handed to `createBuffers`.
pub static CALLBACKS: Callbacks = Callbacks {
    buffer_switch: on_buffer_switch,
    sample_rate_did_change: on_sample_rate_did_change,
    asio_message: on_asio_message,
    buffer_switch_time_info: on_buffer_switch_time_info,
};

unsafe extern "C" fn on_buffer_switch(index: i32, _direct_process: i32) {
    slot::with_active(|d| d.buffer_switch(index));
}

unsafe extern "C" fn on_sample_rate_did_change(rate: f64) {
    slot::with_active(|d| d.sample_rate_did_change(rate));
}

unsafe extern "C" fn on_asio_message(
    selector: i32,
    value: i32,
    _message: *mut c_void,
    _opt: *mut f64,
) -> i32 {
    slot::with_active(|d| d.asio_message(selector, value)).unwrap_or(0)
}

unsafe extern "C" fn on_buffer_switch_time_info(
    params: *mut AsioTime,
    index: i32,
    _direct_process: i32,
) -> *mut AsioTime {
    slot::with_active(|d| d.buffer_switch_time_info(params, index)).unwrap_or(params)
}

/// Moves one period per callback from the ring into the driver's buffers.
pub struct Dispatcher {
    reader: PlaneReader,
    buffers: Vec<[NonNull<u8>; 2]>,
    sample_type: SampleType,
    period_frames: usize,
    period_bytes: usize,
    underruns: Arc<AtomicU64>,
}

// The buffer pointers are only dereferenced on the driver's callback thread.
unsafe impl Send for Dispatcher {}

impl Dispatcher {
    /// # Safety
    ///
    /// Both halves of every entry in `buffers` must point at
    /// `period_frames * sample_type.bytes()` writable bytes for as long as
    /// the dispatcher may be called.
    pub unsafe fn new(
        reader: PlaneReader,
        buffers: Vec<[NonNull<u8>; 2]>,
        sample_type: SampleType,
        period_frames: usize,
        underruns: Arc<AtomicU64>,
    ) -> Self {
        Self {
            reader,
            buffers,
            sample_type,
            period_frames,
            period_bytes: period_frames * sample_type.bytes(),
            underruns,
        }
    }

    /// Fill buffer half `index` of every plane with one period, or with
    /// silence when less than a period is buffered.
    pub fn buffer_switch(&mut self, index: i32) {
        let half = match index {
            0 => 0,
            1 => 1,
            _ => return,
        };
        if self.reader.read_size() >= self.period_bytes {
            for (plane, halves) in self.buffers.iter().enumerate() {
                // SAFETY: guaranteed by the contract of `Dispatcher::new`.
                let dst =
                    unsafe { slice::from_raw_parts_mut(halves[half].as_ptr(), self.period_bytes) };
                self.reader.read(dst, plane);
            }
        } else {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            for halves in &self.buffers {
                // SAFETY: as above.
                let dst =
                    unsafe { slice::from_raw_parts_mut(halves[half].as_ptr(), self.period_bytes) };
                fill_silence(dst, self.sample_type, self.period_frames);
            }
        }
    }

    pub fn sample_rate_did_change(&mut self, _rate: f64) {}

    pub fn asio_message(&mut self, _selector: i32, _value: i32) -> i32 {
        0
    }

    pub fn buffer_switch_time_info(&mut self, params: *mut AsioTime, index: i32) -> *mut AsioTime {
        self.buffer_switch(index);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::asio::ring::{PlaneWriter, plane_ring};

    struct Fixture {
        halves: Vec<[Vec<u8>; 2]>,
        writer: PlaneWriter,
        dispatcher: Dispatcher,
        underruns: Arc<AtomicU64>,
    }

    fn fixture(planes: usize, period: usize, sample_type: SampleType) -> Fixture {
        let bytes = period * sample_type.bytes();
        let mut halves: Vec<[Vec<u8>; 2]> = (0..planes)
            .map(|_| [vec![0xAA; bytes], vec![0xAA; bytes]])
            .collect();
        let pointers = halves
            .iter_mut()
            .map(|[a, b]| {
                [
                    NonNull::new(a.as_mut_ptr()).unwrap(),
                    NonNull::new(b.as_mut_ptr()).unwrap(),
                ]
            })
            .collect();
        let (writer, reader) = plane_ring(bytes * 3, planes).unwrap();
        let underruns = Arc::new(AtomicU64::new(0));
        let dispatcher =
            unsafe { Dispatcher::new(reader, pointers, sample_type, period, underruns.clone()) };
        Fixture {
            halves,
            writer,
            dispatcher,
            underruns,
        }
    }

    #[test]
    fn full_period_is_copied_into_requested_half() {
        let mut f = fixture(2, 4, SampleType::INT16_LSB);
        f.writer.write(&[1; 8], 0);
        f.writer.write(&[2; 8], 1);
        f.dispatcher.buffer_switch(1);
        assert_eq!(f.halves[0][1], [1; 8]);
        assert_eq!(f.halves[1][1], [2; 8]);
        assert_eq!(f.halves[0][0], [0xAA; 8]);
        assert_eq!(f.writer.read_size(), 0);
        assert_eq!(f.underruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn short_ring_yields_silence_and_keeps_data() {
        let mut f = fixture(2, 4, SampleType::FLOAT32_LSB);
        f.writer.write_all(&[5; 12]);
        f.dispatcher.buffer_switch(0);
        assert_eq!(f.halves[0][0], [0; 16]);
        assert_eq!(f.halves[1][0], [0; 16]);
        assert_eq!(f.writer.read_size(), 12);
        assert_eq!(f.underruns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dsd_underrun_uses_dsd_silence() {
        let mut f = fixture(1, 8, SampleType::DSD_INT8_MSB1);
        f.dispatcher.buffer_switch(0);
        assert_eq!(f.halves[0][0], [0x69; 8]);

        let mut f = fixture(1, 8, SampleType::DSD_INT8_NER8);
        f.dispatcher.buffer_switch(1);
        assert_eq!(f.halves[0][1], [0, 1, 1, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn foreign_index_is_ignored() {
        let mut f = fixture(1, 2, SampleType::INT16_MSB);
        f.writer.write_all(&[3; 4]);
        f.dispatcher.buffer_switch(2);
        f.dispatcher.buffer_switch(-1);
        assert_eq!(f.halves[0], [vec![0xAA; 4], vec![0xAA; 4]]);
        assert_eq!(f.writer.read_size(), 4);
    }

    #[test]
    fn time_info_variant_fills_and_returns_params() {
        let mut f = fixture(1, 2, SampleType::INT16_LSB);
        f.writer.write_all(&[9; 4]);
        let mut time = AsioTime::zeroed();
        let params: *mut AsioTime = &mut time;
        assert_eq!(f.dispatcher.buffer_switch_time_info(params, 0), params);
        assert_eq!(f.halves[0][0], [9; 4]);
        assert_eq!(f.dispatcher.asio_message(1, 0), 0);
    }

    #[test]
    fn trampolines_reach_installed_dispatcher() {
        let _guard = slot::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let Fixture {
            halves,
            mut writer,
            dispatcher,
            ..
        } = fixture(1, 2, SampleType::INT16_LSB);
        let mut claim = slot::claim().unwrap();
        claim.install(Box::new(dispatcher));

        writer.write_all(&[4; 4]);
        unsafe { (CALLBACKS.buffer_switch)(1, 1) };
        assert_eq!(halves[0][1], [4; 4]);

        let mut time = AsioTime::zeroed();
        let params: *mut AsioTime = &mut time;
        let back = unsafe { (CALLBACKS.buffer_switch_time_info)(params, 0, 1) };
        assert_eq!(back, params);
        assert_eq!(halves[0][0], [0; 4]);
        unsafe { (CALLBACKS.sample_rate_did_change)(96_000.0) };
        let reply = unsafe {
            (CALLBACKS.asio_message)(1, 2, std::ptr::null_mut(), std::ptr::null_mut())
        };
        assert_eq!(reply, 0);

        assert!(claim.uninstall().is_some());
        writer.write_all(&[8; 4]);
        unsafe { (CALLBACKS.buffer_switch)(1, 1) };
        assert_eq!(halves[0][1], [4; 4]);
    }
}
